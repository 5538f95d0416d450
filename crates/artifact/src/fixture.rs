//! On-disk repositories for tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::id::{Dependency, DependencyIdentification, PartKey, VersionedArtifactIdentification};
use crate::model::{ArtifactModel, Relocation, write_artifact_descriptor};
use crate::reflection::{ConfiguredReflection, layout};
use crate::repository::{Repository, RepositoryConfiguration};

/// A temporary directory with a remote repository tree (`remote/`) and an
/// empty local repository (`local/`).
pub struct RepoFixture {
    dir: TempDir,
}

/// A descriptor under construction.
pub struct Descriptor {
    model: ArtifactModel,
}

impl RepoFixture {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("remote"))?;
        std::fs::create_dir_all(dir.path().join("local"))?;
        Ok(Self { dir })
    }

    pub fn remote(&self) -> PathBuf {
        self.dir.path().join("remote")
    }

    pub fn local(&self) -> PathBuf {
        self.dir.path().join("local")
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Publishes the descriptor and a binary part.
    pub fn publish(&self, descriptor: Descriptor) -> anyhow::Result<VersionedArtifactIdentification> {
        let id = descriptor.model.id();
        let path = layout::part_path(&self.remote(), &id, &PartKey::descriptor());
        write_artifact_descriptor(&descriptor.model, &path)?;
        let binary = PartKey::new(None, descriptor.model.packaging());
        self.publish_part(&id, &binary, format!("binary of {id}").as_bytes())?;
        Ok(id)
    }

    pub fn publish_part(
        &self,
        id: &VersionedArtifactIdentification,
        part: &PartKey,
        content: &[u8],
    ) -> anyhow::Result<PathBuf> {
        let path = layout::part_path(&self.remote(), id, part);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// One local-typed repository named `central` serving the remote tree.
    pub fn configuration(&self) -> RepositoryConfiguration {
        RepositoryConfiguration {
            repositories: vec![Repository::local("central", self.remote())],
            ..Default::default()
        }
    }

    pub fn reflection(&self) -> anyhow::Result<Arc<ConfiguredReflection>> {
        self.reflection_with(self.configuration())
    }

    pub fn reflection_with(
        &self,
        configuration: RepositoryConfiguration,
    ) -> anyhow::Result<Arc<ConfiguredReflection>> {
        Ok(Arc::new(
            ConfiguredReflection::builder(configuration)
                .local_repository(self.local())
                .build()?,
        ))
    }
}

impl Descriptor {
    pub fn new(coordinate: &str) -> anyhow::Result<Self> {
        let id: VersionedArtifactIdentification = coordinate.parse()?;
        Ok(Self {
            model: ArtifactModel::new(&id, "jar"),
        })
    }

    pub fn packaging(mut self, packaging: &str) -> Self {
        self.model.artifact.packaging = packaging.to_owned();
        self
    }

    pub fn dep(self, coordinate: &str) -> anyhow::Result<Self> {
        Ok(self.depends(coordinate.parse()?))
    }

    pub fn depends(mut self, dependency: Dependency) -> Self {
        self.model.dependencies.push(dependency);
        self
    }

    pub fn parent(mut self, coordinate: &str) -> anyhow::Result<Self> {
        self.model.parent = Some(coordinate.parse::<DependencyIdentification>()?);
        Ok(self)
    }

    pub fn import(mut self, coordinate: &str) -> anyhow::Result<Self> {
        self.model
            .imports
            .push(coordinate.parse::<DependencyIdentification>()?);
        Ok(self)
    }

    pub fn relocated(mut self, relocation: Relocation) -> Self {
        self.model.relocation = Some(relocation);
        self
    }
}
