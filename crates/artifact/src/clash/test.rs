use super::{ClashError, ClashStrategy, resolve_clashes};
use crate::fixture::{Descriptor, RepoFixture};
use crate::id::VersionedArtifactIdentification;
use crate::resolution::AnalysisArtifactResolution;
use crate::resolve::{ResolutionContext, TerminalSpec, TransitiveResolver};

fn solution_names(resolution: &AnalysisArtifactResolution) -> Vec<String> {
    resolution.solutions().map(|a| a.id.to_string()).collect()
}

/// app depends on a and b, which want different versions of lib. Only
/// lib 1.0 depends on old.
fn diverging(fx: &RepoFixture) -> anyhow::Result<AnalysisArtifactResolution> {
    fx.publish(Descriptor::new("com.acme:old#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:lib#1.0")?.dep("com.acme:old#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:lib#2.0")?)?;
    fx.publish(Descriptor::new("com.acme:a#1.0")?.dep("com.acme:lib#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:b#1.0")?.dep("com.acme:lib#2.0")?)?;
    let app = fx.publish(
        Descriptor::new("com.acme:app#1.0")?
            .dep("com.acme:a#1.0")?
            .dep("com.acme:b#1.0")?,
    )?;
    resolve(fx, app)
}

fn resolve(
    fx: &RepoFixture,
    terminal: VersionedArtifactIdentification,
) -> anyhow::Result<AnalysisArtifactResolution> {
    let resolver = TransitiveResolver::new(fx.reflection()?);
    Ok(resolver.resolve(
        ResolutionContext::default(),
        &[TerminalSpec::Artifact(terminal)],
    )?)
}

#[test]
fn highest_version_wins() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let mut resolution = diverging(&fx)?;
    assert_eq!(solution_names(&resolution), [
        "com.acme:old#1.0",
        "com.acme:lib#1.0",
        "com.acme:a#1.0",
        "com.acme:lib#2.0",
        "com.acme:b#1.0",
        "com.acme:app#1.0",
    ]);

    let clashes = resolve_clashes(&mut resolution, ClashStrategy::HighestVersion, true)?;
    assert_eq!(clashes.len(), 1);
    assert_eq!(clashes[0].winner.to_string(), "com.acme:lib#2.0");
    assert_eq!(clashes[0].losers.len(), 1);
    assert_eq!(clashes[0].losers[0].to_string(), "com.acme:lib#1.0");
    assert_eq!(clashes[0].involved.len(), 2);
    assert_eq!(resolution.clashes(), clashes.as_slice());

    // old was only reachable through the loser
    assert_eq!(solution_names(&resolution), [
        "com.acme:a#1.0",
        "com.acme:lib#2.0",
        "com.acme:b#1.0",
        "com.acme:app#1.0",
    ]);
    Ok(())
}

#[test]
fn redirected_edges_remember_the_loser() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let mut resolution = diverging(&fx)?;
    resolve_clashes(&mut resolution, ClashStrategy::HighestVersion, true)?;

    insta::assert_snapshot!(resolution.render(false), @r"
    com.acme:app#1.0
      com.acme:a#1.0 -> com.acme:a#1.0
        com.acme:lib#1.0 -> com.acme:lib#2.0 (was 1.0)
      com.acme:b#1.0 -> com.acme:b#1.0
        com.acme:lib#2.0 -> com.acme:lib#2.0
    ");
    Ok(())
}

#[test]
fn nearest_path_prefers_direct_dependencies() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:lib#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:lib#2.0")?)?;
    fx.publish(Descriptor::new("com.acme:b#1.0")?.dep("com.acme:lib#2.0")?)?;
    let app = fx.publish(
        Descriptor::new("com.acme:app#1.0")?
            .dep("com.acme:b#1.0")?
            .dep("com.acme:lib#1.0")?,
    )?;
    let mut resolution = resolve(&fx, app)?;

    let clashes = resolve_clashes(&mut resolution, ClashStrategy::NearestPath, false)?;
    assert_eq!(clashes[0].winner.to_string(), "com.acme:lib#1.0");
    assert!(
        solution_names(&resolution)
            .iter()
            .all(|s| s != "com.acme:lib#2.0")
    );
    Ok(())
}

#[test]
fn equally_near_versions_are_ambiguous_unless_lenient() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let mut strict = diverging(&fx)?;
    let mut lenient = strict.clone();

    let err = resolve_clashes(&mut strict, ClashStrategy::NearestPath, false)
        .expect_err("tie must be reported");
    let ClashError::Ambiguity { candidates, .. } = &err;
    assert_eq!(candidates.len(), 2);
    assert_eq!(
        err.to_string(),
        "cannot decide between com.acme:lib#1.0, com.acme:lib#2.0 for com.acme:lib: equally near \
         to the terminals"
    );

    // declaration order decides
    let clashes = resolve_clashes(&mut lenient, ClashStrategy::NearestPath, true)?;
    assert_eq!(clashes[0].winner.to_string(), "com.acme:lib#1.0");
    Ok(())
}

#[test]
fn agreeing_versions_do_not_clash() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:lib#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:a#1.0")?.dep("com.acme:lib#1.0")?)?;
    let app = fx.publish(
        Descriptor::new("com.acme:app#1.0")?
            .dep("com.acme:a#1.0")?
            .dep("com.acme:lib#1.0")?,
    )?;
    let mut resolution = resolve(&fx, app)?;
    let before = solution_names(&resolution);

    let clashes = resolve_clashes(&mut resolution, ClashStrategy::HighestVersion, false)?;
    assert!(clashes.is_empty());
    assert_eq!(solution_names(&resolution), before);
    Ok(())
}

/// Everything one run decides, by coordinate.
#[derive(Debug, PartialEq, Eq)]
struct Decisions {
    solutions: Vec<String>,
    winners: Vec<String>,
    losers: Vec<Vec<String>>,
    involved: Vec<Vec<String>>,
    tree: String,
}

fn decide(fx: &RepoFixture, strategy: ClashStrategy) -> anyhow::Result<Decisions> {
    let app: VersionedArtifactIdentification = "com.acme:app#1.0".parse()?;
    let mut resolution = resolve(fx, app)?;
    let clashes = resolve_clashes(&mut resolution, strategy, true)?;

    let edge = |key| {
        let edge = resolution.dependency(key);
        let depender = edge.depender.map(|a| resolution.artifact(a).id.to_string());
        format!("{depender:?} -> {}", edge.declaration)
    };
    Ok(Decisions {
        solutions: solution_names(&resolution),
        winners: clashes.iter().map(|c| c.winner.to_string()).collect(),
        losers: clashes
            .iter()
            .map(|c| c.losers.iter().map(ToString::to_string).collect())
            .collect(),
        involved: clashes
            .iter()
            .map(|c| c.involved.iter().map(|k| edge(*k)).collect())
            .collect(),
        tree: resolution.render(false),
    })
}

#[test]
fn repeated_resolutions_decide_alike() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    diverging(&fx)?;
    for strategy in [ClashStrategy::HighestVersion, ClashStrategy::NearestPath] {
        let first = decide(&fx, strategy)?;
        assert_eq!(first.winners.len(), 1, "{strategy:?}");
        assert_eq!(first.involved[0], [
            "Some(\"com.acme:a#1.0\") -> com.acme:lib#1.0",
            "Some(\"com.acme:b#1.0\") -> com.acme:lib#2.0",
        ]);
        for _ in 0..3 {
            assert_eq!(decide(&fx, strategy)?, first, "{strategy:?}");
        }
    }
    Ok(())
}
