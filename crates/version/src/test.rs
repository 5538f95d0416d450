use super::*;

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

#[test]
fn numeric_components_order_before_qualifiers() {
    assert!(v("1.2") < v("1.10"));
    assert!(v("1.9.9") < v("2"));
    assert_eq!(v("1.0"), v("1.0.0"));
    assert!(v("1.0-alpha1") < v("1.0-beta"));
    assert!(v("1.0-beta2") < v("1.0-rc1"));
    assert!(v("1.0-rc1") < v("1.0-rc2"));
    assert!(v("1.0-rc2") < v("1.0-SNAPSHOT"));
    assert!(v("1.0-SNAPSHOT") < v("1.0"));
    assert!(v("1.0") < v("1.0-sp1"));
    assert_eq!(v("2.0.0.Final"), v("2.0"));
}

#[test]
fn equal_versions_hash_alike() {
    use std::collections::HashSet;

    let set: HashSet<Version> = [v("1.0"), v("1.0.0"), v("1.0-ga")].into_iter().collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn snapshot_detection() {
    assert!(v("3.1-SNAPSHOT").is_snapshot());
    assert!(v("3.1-rc1-snapshot").is_snapshot());
    assert!(!v("3.1").is_snapshot());
}

#[test]
fn display_keeps_original_text() {
    assert_eq!(v("2.0.0.Final").to_string(), "2.0.0.Final");
    assert_eq!(v("2.0.0.Final").qualifier(), Some("Final"));
    assert_eq!(v("2.0.0.Final").numbers(), &[2, 0, 0]);
}

#[test]
fn rejects_non_numeric() {
    assert_eq!(Version::parse(""), Err(VersionError::Empty));
    assert!(matches!(
        Version::parse("latest"),
        Err(VersionError::NotNumeric(_))
    ));
}

#[test]
fn interval_ranges() -> anyhow::Result<()> {
    let range: VersionRange = "[1.0,2.0)".parse()?;
    assert!(range.contains(&v("1.0")));
    assert!(range.contains(&v("1.9.9")));
    assert!(!range.contains(&v("2.0")));
    assert!(!range.contains(&v("0.9")));

    let open: VersionRange = "(,3]".parse()?;
    assert!(open.contains(&v("0.1")));
    assert!(open.contains(&v("3")));
    assert!(!open.contains(&v("3.0.1")));

    let union: VersionRange = "[1,2), [3,4)".parse()?;
    assert!(union.contains(&v("3.5")));
    assert!(!union.contains(&v("2.5")));
    Ok(())
}

#[test]
fn pinned_and_exact_ranges() -> anyhow::Result<()> {
    let pinned: VersionRange = "[1.5]".parse()?;
    assert_eq!(pinned.exact(), Some(&v("1.5")));
    assert!(!pinned.contains(&v("1.6")));

    let exact: VersionRange = "1.5".parse()?;
    assert_eq!(exact.exact(), Some(&v("1.5")));
    assert_eq!(VersionRange::parse("*")?, VersionRange::Any);
    assert!(VersionRange::parse("[1.0,2.0").is_err());
    Ok(())
}

#[test]
fn best_match_picks_highest_contained() -> anyhow::Result<()> {
    let versions = [v("1.0"), v("1.4"), v("2.0"), v("1.5-SNAPSHOT")];
    let range: VersionRange = "[1.0,2.0)".parse()?;
    assert_eq!(range.best_match(&versions), Some(&v("1.5-SNAPSHOT")));

    let none: VersionRange = "[5,)".parse()?;
    assert_eq!(none.best_match(&versions), None);
    Ok(())
}

#[cfg(feature = "semver")]
#[test]
fn semver_requirements() -> anyhow::Result<()> {
    let req: VersionRange = "^1.2".parse()?;
    assert!(req.contains(&v("1.4")));
    assert!(!req.contains(&v("2.0")));
    assert!(!req.contains(&v("1.3-rc1")));
    Ok(())
}

#[test]
fn ranges_render_back() -> anyhow::Result<()> {
    let rendered: Vec<String> = ["[1.0,2.0)", "(,3]", "[1.5]", "[1,2),[3,4)", "*", "1.0"]
        .iter()
        .map(|s| VersionRange::parse(s).map(|r| r.to_string()))
        .collect::<Result<_, _>>()?;
    insta::assert_snapshot!(rendered.join(" "), @"[1.0,2.0) (,3] [1.5] [1,2),[3,4) * 1.0");
    Ok(())
}
