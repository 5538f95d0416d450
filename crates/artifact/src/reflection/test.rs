use url::Url;

use super::{RepositoryReflection, layout};
use crate::fixture::{Descriptor, RepoFixture};
use crate::id::{PartKey, VersionedArtifactIdentification};
use crate::model::{ArtifactModel, write_artifact_descriptor};
use crate::reason::{Reason, ReasonKind};
use crate::repository::{
    ArtifactFilter, QualifiedArtifactFilter, RemoteRepository, Repository, RepositoryKind,
};

#[test]
fn ranges_pick_highest_visible_version() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    for v in ["1.0", "1.5", "2.0", "2.1-SNAPSHOT"] {
        fx.publish(Descriptor::new(&format!("com.acme:lib#{v}"))?)?;
    }

    let reflection = fx.reflection()?;
    let resolved = reflection.resolve_dependency(&"com.acme:lib#[1.0,2.0)".parse()?);
    assert_eq!(resolved?.to_string(), "com.acme:lib#1.5");

    let url = Url::from_directory_path(fx.remote()).map_err(|_| anyhow::anyhow!("bad path"))?;
    let mut central = Repository::new(
        "central",
        RepositoryKind::Remote(RemoteRepository {
            url: Some(url),
            snapshots: Some(false),
            ..Default::default()
        }),
    );
    central.artifact_filter = Some(ArtifactFilter::Negation {
        operand: Box::new(ArtifactFilter::Qualified(QualifiedArtifactFilter {
            version: Some("[2.0]".parse()?),
            ..Default::default()
        })),
    });
    let mut configuration = fx.configuration();
    configuration.repositories = vec![central];

    let reflection = fx.reflection_with(configuration)?;
    let resolved = reflection.resolve_dependency(&"com.acme:lib#[1.0,)".parse()?);
    assert_eq!(resolved?.to_string(), "com.acme:lib#1.5");

    let hidden = reflection.resolve_dependency(&"com.acme:lib#2.0".parse()?);
    assert!(matches!(hidden, Err(Reason { kind: ReasonKind::UnresolvedDependency, .. })));
    Ok(())
}

#[test]
fn descriptors_are_cached_locally() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let id = fx.publish(Descriptor::new("com.acme:app#1.0")?.dep("com.acme:lib#1.0")?)?;

    let reflection = fx.reflection()?;
    let model = reflection.resolve_artifact(&id)?;
    assert_eq!(model.dependencies.len(), 1);
    assert_eq!(reflection.descriptor_origin(&id).as_deref(), Some("central"));

    let cached = layout::part_path(&fx.local(), &id, &PartKey::descriptor());
    assert!(cached.is_file());
    assert!(!reflection.locks().is_held(&layout::solution_dir(&fx.local(), &id)));

    // a fresh reflection reads the cached copy without contacting a repository
    let offline = fx.reflection_with(crate::repository::RepositoryConfiguration {
        offline: true,
        ..fx.configuration()
    })?;
    assert_eq!(offline.resolve_artifact(&id)?, model);
    assert_eq!(offline.descriptor_origin(&id), None);
    Ok(())
}

#[test]
fn offline_ranges_use_the_local_repository() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let id: VersionedArtifactIdentification = "com.acme:lib#1.2".parse()?;
    write_artifact_descriptor(
        &ArtifactModel::new(&id, "jar"),
        &layout::part_path(&fx.local(), &id, &PartKey::descriptor()),
    )?;
    fx.publish(Descriptor::new("com.acme:lib#1.9")?)?;

    let reflection = fx.reflection_with(crate::repository::RepositoryConfiguration {
        offline: true,
        ..fx.configuration()
    })?;
    let resolved = reflection.resolve_dependency(&"com.acme:lib#[1,2)".parse()?)?;
    assert_eq!(resolved, id);
    Ok(())
}

#[test]
fn mismatched_descriptor_is_invalid() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let wanted: VersionedArtifactIdentification = "com.acme:lib#1.0".parse()?;
    let other: VersionedArtifactIdentification = "com.acme:other#1.0".parse()?;
    write_artifact_descriptor(
        &ArtifactModel::new(&other, "jar"),
        &layout::part_path(&fx.remote(), &wanted, &PartKey::descriptor()),
    )?;

    let failure = fx.reflection()?.resolve_artifact(&wanted);
    assert!(matches!(failure, Err(Reason { kind: ReasonKind::InvalidArtifact, .. })));
    Ok(())
}

#[test]
fn configuration_failure_poisons_every_lookup() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let id = fx.publish(Descriptor::new("com.acme:lib#1.0")?)?;
    let mut configuration = fx.configuration();
    configuration.failure = Some(Reason::new(ReasonKind::Validation, "broken view"));

    let reflection = fx.reflection_with(configuration)?;
    let failure = reflection
        .resolve_artifact(&id)
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected a failure"))?;
    assert_eq!(failure.kind, ReasonKind::ConfigurationFailure);
    assert_eq!(failure.leaves()[0].text, "broken view");
    assert!(reflection.list_available_parts(&id).is_err());
    Ok(())
}

#[test]
fn parts_are_listed_and_downloaded() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let id = fx.publish(Descriptor::new("com.acme:lib#1.0")?)?;
    fx.publish_part(&id, &PartKey::sources(), b"sources")?;
    let stray = layout::download_path(&layout::part_path(&fx.remote(), &id, &PartKey::docs()));
    std::fs::write(stray, b"half")?;

    let reflection = fx.reflection()?;
    let parts = reflection.list_available_parts(&id)?;
    assert_eq!(parts, [PartKey::binary(), PartKey::descriptor(), PartKey::sources()]);

    let target = fx.path().join("download/lib-sources.jar");
    let served = reflection.download_part(&id, &PartKey::sources(), &target)?;
    assert_eq!(served.as_deref(), Some("central"));
    assert_eq!(std::fs::read(&target)?, b"sources");

    let missing = reflection.download_part(&id, &PartKey::docs(), &target)?;
    assert_eq!(missing, None);
    Ok(())
}
