//! Notifications emitted while enriching, fired synchronously on the thread
//! doing the work.

use std::error::Error;

use tracing::Span;

use crate::id::{PartKey, VersionedArtifactIdentification};

//================================================================================================
// Types
//================================================================================================

/// Observer of enrichment transactions. Every method defaults to a no-op.
pub trait EnrichListener: Send + Sync {
    /// A transaction acquired its lock and is about to fetch `parts`.
    fn enriching_started(
        &self,
        _artifact: &VersionedArtifactIdentification,
        _walk_scope: &str,
        _parts: &[PartKey],
    ) {
    }

    /// One part was fetched into its staging file.
    fn part_downloaded(
        &self,
        _artifact: &VersionedArtifactIdentification,
        _part: &PartKey,
        _repository: Option<&str>,
    ) {
    }

    /// No repository had the part; the transaction goes on without it.
    fn part_not_found(&self, _artifact: &VersionedArtifactIdentification, _part: &PartKey) {}

    /// Fetching the part failed; the transaction rolls back.
    fn part_failed(
        &self,
        _artifact: &VersionedArtifactIdentification,
        _part: &PartKey,
        _error: &dyn Error,
    ) {
    }

    /// The transaction committed (`success`) or rolled back.
    fn enriching_finished(&self, _artifact: &VersionedArtifactIdentification, _success: bool) {}
}

/// Ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

/// Reports enrichment through `tracing`. The enricher runs each transaction
/// inside an `enrich` span; this listener turns it into a progress bar over
/// the wanted parts.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingListener;

//================================================================================================
// Impls
//================================================================================================

impl EnrichListener for NoopListener {}

impl EnrichListener for TracingListener {
    fn enriching_started(
        &self,
        artifact: &VersionedArtifactIdentification,
        walk_scope: &str,
        parts: &[PartKey],
    ) {
        crate::log::set_bar(
            &Span::current(),
            &format!("📦 {artifact} ({walk_scope})"),
            parts.len() as u64,
        );
        tracing::debug!(
            message = "enriching solution",
            artifact.id = %artifact,
            parts = parts.len()
        );
    }

    fn part_downloaded(
        &self,
        artifact: &VersionedArtifactIdentification,
        part: &PartKey,
        repository: Option<&str>,
    ) {
        crate::log::tick(&Span::current());
        tracing::debug!(
            artifact.id = %artifact,
            part = %part,
            repository = repository.unwrap_or("local"),
            "fetched part"
        );
    }

    fn part_not_found(&self, artifact: &VersionedArtifactIdentification, part: &PartKey) {
        crate::log::tick(&Span::current());
        tracing::info!(
            message = "part not available in any repository",
            artifact.id = %artifact,
            part = %part
        );
    }

    fn part_failed(
        &self,
        artifact: &VersionedArtifactIdentification,
        part: &PartKey,
        error: &dyn Error,
    ) {
        tracing::warn!(
            message = "failed to fetch part",
            artifact.id = %artifact,
            part = %part,
            error = %error
        );
    }

    fn enriching_finished(&self, artifact: &VersionedArtifactIdentification, success: bool) {
        if success {
            tracing::debug!(artifact.id = %artifact, "enriched");
        } else {
            tracing::warn!(message = "enrichment rolled back", artifact.id = %artifact);
        }
    }
}
