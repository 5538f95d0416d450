//! # Repository View Merging
//!
//! Folds an ordered list of [`RepositoryView`]s into one
//! [`RepositoryConfiguration`].
//!
//! ## Steps
//!
//! 1. **Validation.** Every repository of every view must be present and
//!    named, and every selector must compile. All violations are collected
//!    into one [`MergeError::Validation`].
//! 2. **Merge by name.** Views are merged in order. A repository whose name
//!    is already known is merged field by field into the known one: unset
//!    fields never overwrite set ones, and artifact filters accumulate into a
//!    disjunction with the newer operands first. When the newer repository is
//!    of a more specific variant the result takes that variant, keeping only
//!    the fields it declares.
//! 3. **Enrichment.** The enrichments of all views are applied to the merged
//!    repositories their selectors pick.
//! 4. **Normalization.** Single operand disjunctions collapse to their
//!    operand, empty ones to no filter, and equal disjunctions are shared.
//! 5. **Development mode.** Optionally, every filter is wrapped into a
//!    development view restricting on artifact level.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::repository::{
    ArtifactFilter, ConfigurationEnrichment, Repository, RepositoryConfiguration, RepositoryKind,
    RepositoryView,
};

const VALIDATION_HEADER: &str = "Repository view(s) have not passed validation checks:";

//================================================================================================
// Types
//================================================================================================

/// Options of [`merge_views`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Wrap every artifact filter into a development view.
    pub development_mode: bool,
}

/// Errors of [`merge_views`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// One or more views are invalid; the message lists every violation.
    #[error("{0}")]
    Validation(String),
}

//================================================================================================
// Impls
//================================================================================================

impl MergeError {
    /// The error as a [`crate::Reason`].
    pub fn reason(&self) -> crate::Reason {
        crate::Reason::new(crate::ReasonKind::Validation, self.to_string())
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Merges `views` in order into one configuration.
pub fn merge_views(
    views: &[RepositoryView],
    options: &MergeOptions,
) -> Result<RepositoryConfiguration, MergeError> {
    validate(views)?;

    let mut repositories: Vec<Repository> = Vec::new();
    for view in views {
        for source in view.repositories.iter().flatten() {
            match repositories.iter_mut().find(|r| r.name == source.name) {
                Some(target) => {
                    let merged = merge_repository(source, target);
                    *target = merged;
                },
                None => repositories.push(merge_repository(source, &empty_like(source))),
            }
        }
    }

    for enrichment in views.iter().flat_map(|v| &v.enrichments) {
        enrich(&mut repositories, enrichment);
    }

    normalize(&mut repositories);
    if options.development_mode {
        wrap_development_views(&mut repositories);
    }

    tracing::debug!(
        views = views.len(),
        repositories = repositories.len(),
        "merged repository views"
    );
    Ok(RepositoryConfiguration {
        repositories,
        ..Default::default()
    })
}

fn validate(views: &[RepositoryView]) -> Result<(), MergeError> {
    let mut summary = String::new();
    for (index, view) in views.iter().enumerate() {
        let mut violations = String::new();
        for repository in &view.repositories {
            match repository {
                None => violations.push_str(" - Repository should not be null.\n"),
                Some(r) if r.name.trim().is_empty() => {
                    violations.push_str(" - Repository name should be set.\n")
                },
                Some(_) => {},
            }
        }
        for enrichment in &view.enrichments {
            if let Err(e) = enrichment.selector().compile() {
                let _ = writeln!(violations, " - Repository selector is invalid: {e}");
            }
        }
        if !violations.is_empty() {
            let _ = writeln!(summary, "Check {}", view.label(index));
            summary.push_str(&violations);
        }
    }

    if summary.is_empty() {
        return Ok(());
    }
    Err(MergeError::Validation(format!(
        "{VALIDATION_HEADER}\n{summary}"
    )))
}

fn empty_like(source: &Repository) -> Repository {
    Repository {
        kind: source.kind.emptied(),
        ..Default::default()
    }
}

/// Merges `source` into `target`. The result has the variant of `target`
/// unless `source` is more specific.
fn merge_repository(source: &Repository, target: &Repository) -> Repository {
    let mut merged = if source.kind.is_assignable_from(&target.kind) {
        target.clone()
    } else {
        Repository {
            kind: carry_fields(&target.kind, source.kind.emptied()),
            ..target.clone()
        }
    };

    if !source.name.is_empty() {
        merged.name.clone_from(&source.name);
    }
    if source.offline.is_some() {
        merged.offline = source.offline;
    }
    if source.cachable.is_some() {
        merged.cachable = source.cachable;
    }
    if let Some(filter) = &source.artifact_filter {
        merge_filter(&mut merged, filter);
    }
    overlay_kind(&mut merged.kind, &source.kind);
    merged
}

/// Copies the set fields of `from` that `into` declares too.
fn carry_fields(from: &RepositoryKind, mut into: RepositoryKind) -> RepositoryKind {
    overlay_kind(&mut into, from);
    into
}

macro_rules! overlay {
    ($target:expr, $source:expr; $($field:ident),+) => {{
        $(
            if $source.$field.is_some() {
                $target.$field.clone_from(&$source.$field);
            }
        )+
    }};
}

/// Overlays the set variant fields of `source` onto `target` when both are
/// of the same variant.
fn overlay_kind(target: &mut RepositoryKind, source: &RepositoryKind) {
    match (target, source) {
        (RepositoryKind::Local(t), RepositoryKind::Local(s)) => overlay!(t, s; root_path),
        (RepositoryKind::Remote(t), RepositoryKind::Remote(s)) => {
            overlay!(t, s; url, user, password, snapshots, releases)
        },
        (RepositoryKind::Codebase(t), RepositoryKind::Codebase(s)) => {
            overlay!(t, s; root_path, template)
        },
        _ => {},
    }
}

/// Accumulates `filter` into the filter of `repository`, newer operands
/// first.
fn merge_filter(repository: &mut Repository, filter: &ArtifactFilter) {
    let Some(existing) = repository.artifact_filter.take() else {
        repository.artifact_filter = Some(filter.clone());
        return;
    };

    let mut operands = operands_of(filter);
    operands.extend(operands_of(&existing));
    repository.artifact_filter = Some(ArtifactFilter::any_of(operands));
}

fn operands_of(filter: &ArtifactFilter) -> Vec<ArtifactFilter> {
    match filter {
        ArtifactFilter::Disjunction { operands } => operands.as_ref().clone(),
        other => vec![other.clone()],
    }
}

fn enrich(repositories: &mut [Repository], enrichment: &ConfigurationEnrichment) {
    // selectors were compiled during validation
    let Ok(selector) = enrichment.selector().compile() else {
        return;
    };
    for repository in repositories.iter_mut().filter(|r| selector.selects(r)) {
        tracing::trace!(repository = %repository.name, "enriching repository");
        match enrichment {
            ConfigurationEnrichment::Repository {
                repository: source,
                ..
            } => {
                let merged = merge_repository(source, repository);
                *repository = merged;
            },
            ConfigurationEnrichment::ArtifactFilter {
                artifact_filter, ..
            } => merge_filter(repository, artifact_filter),
        }
    }
}

fn normalize(repositories: &mut [Repository]) {
    let mut shared: Vec<Arc<Vec<ArtifactFilter>>> = Vec::new();
    for repository in repositories.iter_mut() {
        let operands = match &repository.artifact_filter {
            Some(ArtifactFilter::Disjunction { operands }) => Arc::clone(operands),
            _ => continue,
        };
        repository.artifact_filter = match operands.len() {
            0 => None,
            1 => Some(operands[0].clone()),
            _ => {
                let operands = match shared.iter().find(|s| s.as_slice() == operands.as_slice()) {
                    Some(known) => Arc::clone(known),
                    None => {
                        shared.push(Arc::clone(&operands));
                        operands
                    },
                };
                Some(ArtifactFilter::Disjunction { operands })
            },
        };
    }
}

fn wrap_development_views(repositories: &mut [Repository]) {
    let mut shared: Vec<Arc<ArtifactFilter>> = Vec::new();
    for repository in repositories.iter_mut() {
        let Some(filter) = repository.artifact_filter.take() else {
            continue;
        };
        let restriction = match shared.iter().find(|s| ***s == filter) {
            Some(known) => Arc::clone(known),
            None => {
                let restriction = Arc::new(filter);
                shared.push(Arc::clone(&restriction));
                restriction
            },
        };
        repository.artifact_filter = Some(ArtifactFilter::DevelopmentView {
            restriction,
            restrict_on_artifact_level: true,
        });
    }
}
