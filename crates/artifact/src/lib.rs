//! # Artifact Crate
//!
//! The `artifact` crate resolves build-artifact dependencies across several artifact
//! repositories and fetches the files ("parts") that resolved artifacts consist of.
//!
//! ## Key Concepts
//!
//! **Coordinates** identify an artifact by group, name and version
//! (`com.acme:lib#1.2`). A **dependency** pairs a coordinate (or version range)
//! with a scope, an optional flag, a part type and exclusions.
//!
//! A **resolution** is the transitive graph reachable from a set of
//! **terminals**. Every distinct coordinate appears exactly once as a
//! **solution**; dependencies refer to solutions by key, and solutions keep
//! back references to every dependency that reached them.
//!
//! **Parts** (descriptor, binary, sources, docs) are fetched on demand by the
//! enrichment engine, one transaction per solution, under a per-solution lock,
//! so partially downloaded files never become visible.
//!
//! **Repository views** are partial repository configurations carried by
//! artifacts; [`merge`] folds them into one [`repository::RepositoryConfiguration`].
//!
//! ## Architecture
//!
//! - [`id`] - Coordinates, scopes, part keys and exclusions.
//! - [`model`] - The artifact descriptor model and its TOML adapter.
//! - [`reason`] - Tree structured failure reasons.
//! - [`repository`] - Repository variants, artifact filters, views and selectors.
//! - [`reflection`] - Version probing, descriptor and part access per repository.
//! - [`resolution`] - The arena holding a resolved dependency graph.
//! - [`resolve`] - The transitive and classpath resolvers.
//! - [`clash`] - Picking one version per group and name.
//! - [`enrich`] - The transactional part enricher and its worker queue.
//! - [`merge`] - Merging repository views into one configuration.
//! - [`setup`] - Building a repository configuration from view artifacts.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use artifact::reflection::{ConfiguredReflection, FileSystemTransport};
//! use artifact::repository::RepositoryConfiguration;
//! use artifact::resolve::{ResolutionContext, TerminalSpec, TransitiveResolver};
//!
//! let configuration = RepositoryConfiguration::read("repository-configuration.toml".as_ref())?;
//! let reflection = ConfiguredReflection::builder(configuration)
//!     .transport(Arc::new(FileSystemTransport))
//!     .build()?;
//! let resolver = TransitiveResolver::new(Arc::new(reflection));
//!
//! let terminal = TerminalSpec::Dependency("com.acme:app#[1.0,2.0)".parse()?);
//! let resolution = resolver.resolve(ResolutionContext::default(), &[terminal])?;
//! for solution in resolution.solutions() {
//!     println!("{}", solution.id);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

pub use self::abort::AbortSignal;
pub use self::id::{
    ArtifactIdentification, Dependency, DependencyIdentification, Exclusion, PartKey, Scope,
    VersionedArtifactIdentification,
};
pub use self::model::ArtifactModel;
pub use self::reason::{Reason, ReasonKind};
pub use self::resolution::{AnalysisArtifact, AnalysisArtifactResolution, AnalysisDependency};
pub use depot_version::{Version, VersionRange};

mod abort;
pub mod clash;
pub mod enrich;
pub mod id;
pub mod lock;
pub mod log;
pub mod merge;
pub mod model;
pub mod reason;
pub mod reflection;
pub mod repository;
pub mod resolution;
pub mod resolve;
pub mod setup;

#[cfg(test)]
mod fixture;
