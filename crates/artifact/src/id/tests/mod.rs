use super::*;

#[test]
fn parse_coordinates() -> anyhow::Result<()> {
    let id: VersionedArtifactIdentification = "com.acme:lib#1.2".parse()?;
    assert_eq!(id.group(), "com.acme");
    assert_eq!(id.name(), "lib");
    assert_eq!(id.version, Version::parse("1.2")?);
    assert_eq!(id.to_string(), "com.acme:lib#1.2");

    let dep: Dependency = "com.acme:lib#[1.0,2.0)".parse()?;
    assert_eq!(dep.scope, Scope::Compile);
    assert_eq!(dep.kind, "jar");
    assert!(dep.version.contains(&Version::parse("1.5")?));

    let any: DependencyIdentification = "com.acme:lib".parse()?;
    assert_eq!(any.version, VersionRange::Any);
    Ok(())
}

#[test]
fn reject_malformed() {
    assert!(matches!(
        "lib#1.0".parse::<VersionedArtifactIdentification>(),
        Err(IdError::Malformed(_))
    ));
    assert!(matches!(
        "com.acme:lib".parse::<VersionedArtifactIdentification>(),
        Err(IdError::MissingVersion(_))
    ));
    assert!(matches!(
        "a:b:c".parse::<ArtifactIdentification>(),
        Err(IdError::Malformed(_))
    ));
    assert!(matches!("a:b:c".parse::<PartKey>(), Err(IdError::Part(_))));
}

#[test]
fn part_file_names() -> anyhow::Result<()> {
    let id: VersionedArtifactIdentification = "com.acme:lib#1.0".parse()?;

    assert_eq!(PartKey::binary().file_name(&id), "lib-1.0.jar");
    assert_eq!(PartKey::sources().file_name(&id), "lib-1.0-sources.jar");
    assert_eq!(
        PartKey::from_file_name(&id, "lib-1.0-sources.jar"),
        Some(PartKey::sources())
    );
    assert_eq!(
        PartKey::from_file_name(&id, "lib-1.0.toml"),
        Some(PartKey::descriptor())
    );
    assert_eq!(PartKey::from_file_name(&id, "lib-1.0.1.jar"), None);
    assert_eq!(PartKey::from_file_name(&id, "lib-1.0.jar.download"), None);
    assert_eq!(PartKey::from_file_name(&id, "other-1.0.jar"), None);
    Ok(())
}

#[test]
fn part_key_strings() -> anyhow::Result<()> {
    assert_eq!("sources:jar".parse::<PartKey>()?, PartKey::sources());
    assert_eq!("jar".parse::<PartKey>()?, PartKey::binary());
    assert_eq!(PartKey::repository_view().to_string(), "repositoryview:toml");
    Ok(())
}

#[test]
fn exclusion_wildcards() -> anyhow::Result<()> {
    let lib = ArtifactIdentification::new("com.acme", "lib");
    assert!("com.acme:*".parse::<Exclusion>()?.matches(&lib));
    assert!("*:lib".parse::<Exclusion>()?.matches(&lib));
    assert!("*:*".parse::<Exclusion>()?.matches(&lib));
    assert!(!"org.other:lib".parse::<Exclusion>()?.matches(&lib));
    Ok(())
}

#[test]
fn group_path_splits_dots() {
    let id = ArtifactIdentification::new("com.acme.tools", "lib");
    assert_eq!(id.group_path(), PathBuf::from("com/acme/tools"));
}

#[test]
fn dependency_serde_defaults() -> anyhow::Result<()> {
    let dep: Dependency = toml_edit::de::from_str(
        r#"
        group = "com.acme"
        name = "lib"
        version = "[1.0,2.0)"
        exclusions = ["org.noise:*"]
        "#,
    )?;
    assert_eq!(dep.scope, Scope::Compile);
    assert!(!dep.optional);
    assert_eq!(dep.part_key(), PartKey::binary());
    assert!(
        dep.exclusions
            .iter()
            .any(|e| e.matches(&ArtifactIdentification::new("org.noise", "x")))
    );
    Ok(())
}
