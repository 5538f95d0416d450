//! Paths of artifacts and parts inside a repository tree.
//!
//! ```text
//! <root>/<group-path>/<name>/<version>/<name>-<version>[-<classifier>].<type>
//! ```
//!
//! A part being downloaded lives next to its final location with the
//! [`DOWNLOAD_SUFFIX`] appended until it is renamed into place.

use std::path::{Path, PathBuf};

use crate::id::{ArtifactIdentification, PartKey, VersionedArtifactIdentification};

/// Suffix of in-flight downloads.
pub const DOWNLOAD_SUFFIX: &str = "download";

/// Directory holding all versions of `artifact`.
pub fn artifact_dir(root: &Path, artifact: &ArtifactIdentification) -> PathBuf {
    root.join(artifact.group_path()).join(&artifact.name)
}

/// Directory holding every part of one solution.
pub fn solution_dir(root: &Path, artifact: &VersionedArtifactIdentification) -> PathBuf {
    artifact_dir(root, &artifact.artifact).join(artifact.version.to_string())
}

/// Final location of a part.
pub fn part_path(root: &Path, artifact: &VersionedArtifactIdentification, part: &PartKey) -> PathBuf {
    solution_dir(root, artifact).join(part.file_name(artifact))
}

/// Location of a part while it is being downloaded.
pub fn download_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".");
    name.push(DOWNLOAD_SUFFIX);
    PathBuf::from(name)
}

/// Expands a codebase layout template for `artifact`.
pub fn expand_template(template: &str, artifact: &VersionedArtifactIdentification) -> PathBuf {
    let group_path = artifact.artifact.group.replace('.', "/");
    let expanded = template
        .replace("{groupPath}", &group_path)
        .replace("{group}", &artifact.artifact.group)
        .replace("{name}", &artifact.artifact.name)
        .replace("{version}", &artifact.version.to_string());
    PathBuf::from(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout() -> anyhow::Result<()> {
        let id: VersionedArtifactIdentification = "com.acme:lib#1.0".parse()?;
        let root = Path::new("/repo");
        let path = part_path(root, &id, &PartKey::sources());
        assert_eq!(path, Path::new("/repo/com/acme/lib/1.0/lib-1.0-sources.jar"));
        assert_eq!(
            download_path(&path),
            Path::new("/repo/com/acme/lib/1.0/lib-1.0-sources.jar.download")
        );
        Ok(())
    }

    #[test]
    fn templates() -> anyhow::Result<()> {
        let id: VersionedArtifactIdentification = "com.acme:lib#1.0".parse()?;
        assert_eq!(
            expand_template("{group}/{version}/{name}", &id),
            Path::new("com.acme/1.0/lib")
        );
        assert_eq!(
            expand_template(crate::repository::DEFAULT_CODEBASE_TEMPLATE, &id),
            Path::new("com/acme/lib/1.0")
        );
        Ok(())
    }
}
