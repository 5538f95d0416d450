//! # Transitive Resolution
//!
//! [`TransitiveResolver::resolve`] walks the dependency graph reachable from a
//! set of terminals and returns it as an [`AnalysisArtifactResolution`].
//!
//! ## Walk
//!
//! The walk is depth first and single threaded. For every declared
//! dependency the resolver
//!
//! 1. applies the dependency filter, global and inherited exclusions and the
//!    path filter, recording rejected declarations as filtered;
//! 2. resolves the (possibly ranged) coordinate to one version through the
//!    [`RepositoryReflection`];
//! 3. joins the target once: reads its descriptor and adds parent, import
//!    and relocation edges as the context asks;
//! 4. descends into the target's own dependencies unless it has been walked
//!    already. Later encounters only add a depender.
//!
//! Failures are recorded on the dependency or artifact they concern. A
//! lenient walk carries on and aggregates them into the resolution's failure;
//! a strict one ends with the first [`ResolveError`].
//!
//! Once the graph is complete the solutions are put in dependency order,
//! restricted to the build range and, when asked for, enriched with parts.

mod classpath;
mod context;

use std::collections::HashSet;
use std::sync::Arc;

use either::Either;

pub use self::classpath::{ClasspathContext, ClasspathResolver, ClasspathScope};
pub use self::context::{
    ArtifactPredicate, Boundary, BoundaryHit, BuildRange, DependencyFilter, DependencyPath,
    PathFilter, ResolutionContext, ResolutionContextBuilder, boundary,
};
use crate::AbortSignal;
use crate::clash::ClashError;
use crate::enrich::{EnrichmentQueue, PartEnricher, PartEnrichingContext, WantedParts};
use crate::id::{Dependency, VersionedArtifactIdentification};
use crate::reason::{Reason, ReasonKind};
use crate::reflection::RepositoryReflection;
use crate::resolution::{
    AnalysisArtifactResolution, AnalysisDependency, ArtifactKey, DependencyKey, EdgeKind,
    FilteredDependency,
};

/// Relocations followed silently before giving up on a chain.
const MAX_RELOCATION_HOPS: usize = 8;

//================================================================================================
// Types
//================================================================================================

/// A starting point of a resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalSpec {
    /// A dependency to resolve, possibly ranged.
    Dependency(Dependency),
    /// An artifact whose dependencies are walked directly.
    Artifact(VersionedArtifactIdentification),
}

/// Resolves terminals into a dependency graph.
pub struct TransitiveResolver {
    reflection: Arc<dyn RepositoryReflection>,
    enricher: Arc<PartEnricher>,
    workers: usize,
}

/// Errors ending a resolution.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// A dependency did not resolve in a strict resolution.
    #[error("failed to resolve {dependency}: {reason}")]
    Unresolved {
        /// The dependency.
        dependency: Dependency,
        /// Why it did not resolve.
        reason: Reason,
    },
    /// A descriptor could not be read in a strict resolution.
    #[error("failed to read the descriptor of {artifact}: {reason}")]
    UnresolvedArtifact {
        /// The artifact.
        artifact: VersionedArtifactIdentification,
        /// Why it could not be read.
        reason: Reason,
    },
    /// The abort signal was raised.
    #[error("resolution was aborted")]
    Aborted,
    /// Clash resolution could not pick a winner.
    #[error(transparent)]
    Clash(#[from] ClashError),
    /// The resolution completed with failures and the caller asked for none.
    #[error("resolution is incomplete: {0}")]
    Incomplete(Reason),
    /// The enrichment workers could not be started.
    #[error("failed to start the enrichment workers")]
    Scheduler(#[source] std::io::Error),
}

/// State of one walk.
struct Walk<'r> {
    reflection: &'r dyn RepositoryReflection,
    context: ResolutionContext,
    resolution: AnalysisArtifactResolution,
    joined: HashSet<ArtifactKey>,
    walked: HashSet<ArtifactKey>,
    path: Vec<Dependency>,
    next_order: usize,
}

//================================================================================================
// Impls
//================================================================================================

impl ResolveError {
    /// The error as a [`Reason`].
    pub fn reason(&self) -> Reason {
        match self {
            ResolveError::Unresolved { reason, .. }
            | ResolveError::UnresolvedArtifact { reason, .. }
            | ResolveError::Incomplete(reason) => reason.clone(),
            ResolveError::Aborted => Reason::new(ReasonKind::Aborted, self.to_string()),
            ResolveError::Clash(e) => e.reason(),
            ResolveError::Scheduler(e) => Reason::from_error(e),
        }
    }
}

impl TransitiveResolver {
    /// Creates a resolver enriching through its own [`PartEnricher`].
    pub fn new(reflection: Arc<dyn RepositoryReflection>) -> Self {
        let enricher = Arc::new(PartEnricher::new(Arc::clone(&reflection)));
        Self {
            reflection,
            enricher,
            workers: depot_config::Config::default().workers(),
        }
    }

    /// Enriches through `enricher` with `workers` parallel transactions.
    pub fn with_enricher(mut self, enricher: Arc<PartEnricher>, workers: usize) -> Self {
        self.enricher = enricher;
        self.workers = workers;
        self
    }

    /// The reflection artifacts are resolved through.
    pub fn reflection(&self) -> &Arc<dyn RepositoryReflection> {
        &self.reflection
    }

    /// Resolves `terminals` transitively.
    pub fn resolve(
        &self,
        context: ResolutionContext,
        terminals: &[TerminalSpec],
    ) -> Result<AnalysisArtifactResolution, ResolveError> {
        let span = tracing::info_span!("resolve", terminals = terminals.len());
        crate::log::set_sub_task(&span, &format!("resolving {} terminal(s)", terminals.len()));
        let _enter = span.enter();

        let mut walk = Walk {
            reflection: self.reflection.as_ref(),
            context,
            resolution: AnalysisArtifactResolution::default(),
            joined: HashSet::new(),
            walked: HashSet::new(),
            path: Vec::new(),
            next_order: 0,
        };
        for terminal in terminals {
            walk.terminal(terminal)?;
        }
        walk.collect_solutions();
        walk.collect_failures();
        if let Some(range) = walk.context.build_range.take() {
            walk.apply_build_range(&range);
        }

        let Walk {
            context,
            mut resolution,
            ..
        } = walk;
        tracing::debug!(
            artifacts = resolution.artifacts.len(),
            solutions = resolution.solutions.len(),
            failed = resolution.has_failed(),
            "resolved graph"
        );

        if let Some(enrich) = &context.enrich {
            self.enrich(&mut resolution, enrich, &context.abort)?;
        }
        Ok(resolution)
    }

    /// Enriches every solution of `resolution` with the parts `enrich` wants.
    pub fn enrich(
        &self,
        resolution: &mut AnalysisArtifactResolution,
        enrich: &PartEnrichingContext,
        abort: &AbortSignal,
    ) -> Result<(), ResolveError> {
        self.enrich_with(resolution, &enrich.walk_scope, abort, |_, _| {
            Some(enrich.wanted.clone())
        })
    }

    /// Enriches every solution `wanted` returns parts for, waiting for all
    /// transactions. Failed transactions are recorded on their solution;
    /// solutions skipped for a lock held elsewhere are listed in
    /// [`AnalysisArtifactResolution::contended`].
    pub fn enrich_with(
        &self,
        resolution: &mut AnalysisArtifactResolution,
        walk_scope: &str,
        abort: &AbortSignal,
        wanted: impl Fn(&AnalysisArtifactResolution, ArtifactKey) -> Option<WantedParts>,
    ) -> Result<(), ResolveError> {
        let queue = EnrichmentQueue::new(Arc::clone(&self.enricher), self.workers, abort.clone())
            .map_err(ResolveError::Scheduler)?;
        for key in resolution.solutions.clone() {
            if let Some(parts) = wanted(&*resolution, key) {
                queue.enrich(resolution.artifact(key).solution(), walk_scope, parts);
            }
        }
        let report = queue.finalize_enrichment();

        resolution.contended = report
            .contended
            .iter()
            .filter_map(|id| resolution.lookup(id))
            .collect();
        if !resolution.contended.is_empty() {
            tracing::info!(
                message = "solutions are being enriched elsewhere",
                contended = resolution.contended.len()
            );
        }

        let label = resolution.terminals_label();
        for (id, reason) in report.failed {
            if let Some(key) = resolution.lookup(&id) {
                let artifact = resolution.artifact_mut(key);
                match &mut artifact.failure {
                    Some(failure) => failure.push(reason.clone()),
                    None => artifact.failure = Some(reason.clone()),
                }
            }
            resolution
                .failure
                .get_or_insert_with(|| incomplete_collator(&label))
                .push(reason);
        }
        if abort.is_aborted() {
            return Err(ResolveError::Aborted);
        }
        Ok(())
    }
}

impl AnalysisArtifactResolution {
    fn terminals_label(&self) -> String {
        let labels: Vec<String> = self
            .terminals
            .iter()
            .map(|t| match t {
                Either::Left(d) => self.dependency(*d).declaration.to_string(),
                Either::Right(a) => self.artifact(*a).id.to_string(),
            })
            .collect();
        labels.join(", ")
    }
}

impl Walk<'_> {
    fn check_abort(&self) -> Result<(), ResolveError> {
        if self.context.abort.is_aborted() {
            return Err(ResolveError::Aborted);
        }
        Ok(())
    }

    fn terminal(&mut self, terminal: &TerminalSpec) -> Result<(), ResolveError> {
        match terminal {
            TerminalSpec::Dependency(dependency) => {
                if let Some(key) =
                    self.declaration(None, dependency.clone(), EdgeKind::Standard, true)?
                {
                    self.resolution.terminals.push(Either::Left(key));
                }
            },
            TerminalSpec::Artifact(id) => {
                let key = self.artifact_key(id.clone());
                self.resolution.terminals.push(Either::Right(key));
                self.expand(key, true)?;
            },
        }
        Ok(())
    }

    fn artifact_key(&mut self, id: VersionedArtifactIdentification) -> ArtifactKey {
        match self.resolution.lookup(&id) {
            Some(key) => key,
            None => self.resolution.add_artifact(id),
        }
    }

    /// Whether a declared dependency survives the filters. The declaration is
    /// on top of the path stack.
    fn admits(&mut self, declaration: &Dependency) -> bool {
        let artifact = declaration.artifact();
        if let Some(filter) = &self.context.dependency_filter {
            if !filter(declaration) {
                return false;
            }
        }
        if self
            .context
            .global_exclusions
            .iter()
            .any(|e| e.matches(&artifact))
        {
            return false;
        }
        let ancestors = &self.path[..self.path.len().saturating_sub(1)];
        if self.context.respect_exclusions
            && ancestors
                .iter()
                .any(|d| d.exclusions.iter().any(|e| e.matches(&artifact)))
        {
            return false;
        }
        match &mut self.context.path_filter {
            Some(filter) => filter(&DependencyPath::new(&self.path)),
            None => true,
        }
    }

    /// Processes one declaration of `depender`, returning the new edge unless
    /// the declaration was filtered.
    fn declaration(
        &mut self,
        depender: Option<ArtifactKey>,
        declaration: Dependency,
        kind: EdgeKind,
        standard: bool,
    ) -> Result<Option<DependencyKey>, ResolveError> {
        self.check_abort()?;

        let on_path = kind == EdgeKind::Standard;
        if on_path {
            self.path.push(declaration.clone());
        }
        let result = self.declaration_inner(depender, declaration, kind, standard);
        if on_path {
            self.path.pop();
        }
        result
    }

    fn declaration_inner(
        &mut self,
        depender: Option<ArtifactKey>,
        declaration: Dependency,
        kind: EdgeKind,
        standard: bool,
    ) -> Result<Option<DependencyKey>, ResolveError> {
        if kind == EdgeKind::Standard && depender.is_some() && !self.admits(&declaration) {
            tracing::trace!(dependency = %declaration, "filtered dependency");
            self.resolution.filtered.push(FilteredDependency {
                depender,
                declaration,
            });
            return Ok(None);
        }

        let resolved = self
            .reflection
            .resolve_dependency(&declaration.identification());
        if let (Ok(id), Some(filter)) = (&resolved, &self.context.artifact_filter) {
            if !filter(id) {
                tracing::trace!(artifact.id = %id, "filtered artifact");
                self.resolution.filtered.push(FilteredDependency {
                    depender,
                    declaration,
                });
                return Ok(None);
            }
        }

        let depth = self.path.len().saturating_sub(1);
        let key = self.resolution.add_dependency(AnalysisDependency {
            declaration: declaration.clone(),
            kind,
            depender,
            solution: None,
            replaced: None,
            failure: None,
            depth,
        });
        if let Some(depender) = depender {
            let artifact = self.resolution.artifact_mut(depender);
            match kind {
                EdgeKind::Standard => artifact.dependencies.push(key),
                EdgeKind::Parent => artifact.parent = Some(key),
                EdgeKind::Import => artifact.imports.push(key),
                EdgeKind::Relocation => artifact.relocation = Some(key),
            }
        }

        let id = match resolved {
            Ok(id) => id,
            Err(reason) => {
                tracing::debug!(
                    message = "unresolved dependency",
                    dependency = %declaration,
                    reason = %reason
                );
                if !self.context.lenient {
                    return Err(ResolveError::Unresolved {
                        dependency: declaration,
                        reason,
                    });
                }
                self.resolution.dependency_mut(key).failure = Some(reason);
                return Ok(Some(key));
            },
        };

        let mut target = self.artifact_key(id);
        if !self.context.include_relocation {
            target = self.follow_relocations(target)?;
        }
        self.resolution.dependency_mut(key).solution = Some(target);
        self.resolution.artifact_mut(target).dependers.push(key);

        self.expand(target, standard)?;
        Ok(Some(key))
    }

    fn follow_relocations(&mut self, mut target: ArtifactKey) -> Result<ArtifactKey, ResolveError> {
        for _ in 0..MAX_RELOCATION_HOPS {
            self.join(target)?;
            let artifact = self.resolution.artifact(target);
            let Some(relocation) = artifact.model.as_ref().and_then(|m| m.relocation.clone())
            else {
                return Ok(target);
            };
            let relocated = relocation.target(&artifact.id);
            if relocated == artifact.id {
                return Ok(target);
            }
            tracing::debug!(from = %artifact.id, to = %relocated, "following relocation");
            target = self.artifact_key(relocated);
        }
        let artifact = self.resolution.artifact_mut(target);
        if artifact.failure.is_none() {
            artifact.failure = Some(Reason::new(
                ReasonKind::InvalidArtifact,
                format!("{} relocates too often", artifact.id),
            ));
        }
        Ok(target)
    }

    /// Joins `key` and, when it was reached through declared dependencies,
    /// walks its own dependencies.
    fn expand(&mut self, key: ArtifactKey, standard: bool) -> Result<(), ResolveError> {
        self.join(key)?;
        if !standard || !self.context.include_standard || !self.walked.insert(key) {
            return Ok(());
        }

        let artifact = self.resolution.artifact(key);
        let relocation = artifact
            .relocation
            .and_then(|d| self.resolution.dependency(d).solution);
        let declarations = artifact
            .model
            .as_ref()
            .map(|m| m.dependencies.clone())
            .unwrap_or_default();

        if let Some(target) = relocation {
            self.expand(target, true)?;
        }
        for declaration in declarations {
            self.declaration(Some(key), declaration, EdgeKind::Standard, true)?;
        }

        self.resolution.artifact_mut(key).dependency_order = Some(self.next_order());
        Ok(())
    }

    /// Reads the descriptor of `key` once and adds its structural edges.
    fn join(&mut self, key: ArtifactKey) -> Result<(), ResolveError> {
        if !self.joined.insert(key) {
            return Ok(());
        }
        self.check_abort()?;

        let id = self.resolution.artifact(key).id.clone();
        let model = match self.reflection.resolve_artifact(&id) {
            Ok(model) => model,
            Err(reason) => {
                tracing::debug!(
                    message = "unresolved artifact",
                    artifact.id = %id,
                    reason = %reason
                );
                if !self.context.lenient {
                    return Err(ResolveError::UnresolvedArtifact {
                        artifact: id,
                        reason,
                    });
                }
                let artifact = self.resolution.artifact_mut(key);
                artifact.failure = Some(reason);
                self.finish_structural(key);
                return Ok(());
            },
        };
        {
            let artifact = self.resolution.artifact_mut(key);
            artifact.packaging = model.packaging().to_owned();
            artifact.model = Some(Arc::clone(&model));
        }

        if self.context.include_parent {
            if let Some(parent) = &model.parent {
                self.declaration(Some(key), parent.clone().into(), EdgeKind::Parent, false)?;
            }
        }
        if self.context.include_imports {
            for import in &model.imports {
                self.declaration(Some(key), import.clone().into(), EdgeKind::Import, false)?;
            }
        }
        if self.context.include_relocation {
            if let Some(relocation) = &model.relocation {
                let target = relocation.target(&id);
                if target != id {
                    self.declaration(Some(key), (&target).into(), EdgeKind::Relocation, false)?;
                }
            }
        }
        self.finish_structural(key);
        Ok(())
    }

    fn finish_structural(&mut self, key: ArtifactKey) {
        if self.resolution.artifact(key).dependency_order.is_none() {
            let order = self.next_order();
            self.resolution.artifact_mut(key).dependency_order = Some(order);
        }
    }

    fn next_order(&mut self) -> usize {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    /// Solutions are the readable artifacts reached through declared
    /// dependencies or relocations, in dependency order.
    fn collect_solutions(&mut self) {
        let resolution = &self.resolution;
        let mut solutions: Vec<ArtifactKey> = resolution
            .artifacts()
            .filter(|(_, a)| {
                a.model.is_some()
                    && a.dependers.iter().any(|d| {
                        matches!(
                            resolution.dependency(*d).kind,
                            EdgeKind::Standard | EdgeKind::Relocation
                        )
                    })
            })
            .map(|(k, _)| k)
            .collect();
        // terminal artifacts are solutions without dependers
        for key in resolution.terminal_artifacts() {
            if resolution.artifact(key).model.is_some() && !solutions.contains(&key) {
                solutions.push(key);
            }
        }
        solutions.sort_by_key(|k| resolution.artifact(*k).dependency_order);
        self.resolution.solutions = solutions;
    }

    /// Marks artifacts with failed dependencies incomplete and aggregates
    /// every failure into the resolution's failure.
    fn collect_failures(&mut self) {
        let mut order: Vec<ArtifactKey> = (0..self.resolution.artifacts.len())
            .map(ArtifactKey)
            .collect();
        // dependencies first, so collators see the failures below them
        order.sort_by_key(|k| self.resolution.artifact(*k).dependency_order);

        let mut failure = incomplete_collator(&self.resolution.terminals_label());
        for key in order {
            let artifact = self.resolution.artifact(key);
            let causes: Vec<Reason> = artifact
                .edges()
                .filter_map(|d| self.edge_failure(d))
                .collect();
            if causes.is_empty() {
                continue;
            }

            let mut collator = Reason::new(
                ReasonKind::IncompleteArtifact,
                format!("{} has failed dependencies", artifact.id),
            );
            collator.reasons = causes;
            failure.push(collator.clone());
            self.resolution.incomplete.push(key);
            let artifact = self.resolution.artifact_mut(key);
            if artifact.failure.is_none() {
                artifact.failure = Some(collator);
            }
        }

        for terminal in self.resolution.terminals.clone() {
            let (reason, solution) = match terminal {
                Either::Left(d) => (self.edge_failure(d), self.resolution.dependency(d).solution),
                Either::Right(a) => (self.resolution.artifact(a).failure.clone(), Some(a)),
            };
            if solution.is_some_and(|k| self.resolution.incomplete.contains(&k)) {
                continue;
            }
            if let Some(reason) = reason {
                failure.push(reason);
            }
        }

        if !failure.reasons.is_empty() {
            self.resolution.failure = Some(failure);
        }
    }

    fn edge_failure(&self, key: DependencyKey) -> Option<Reason> {
        let dependency = self.resolution.dependency(key);
        match dependency.solution {
            Some(s) => self.resolution.artifact(s).failure.clone(),
            None => dependency.failure.clone(),
        }
    }

    /// Keeps only the solutions between the boundaries of `range`.
    fn apply_build_range(&mut self, range: &BuildRange) {
        let mut harvest = HashSet::new();
        let mut visited = HashSet::new();
        for terminal in self.resolution.terminal_artifacts() {
            self.harvest(range, terminal, &mut harvest, &mut visited);
        }
        let mut solutions: Vec<ArtifactKey> = harvest.into_iter().collect();
        solutions.sort_by_key(|k| self.resolution.artifact(*k).dependency_order);
        self.resolution.solutions = solutions;
    }

    /// Whether `key` connects to the lower boundary, collecting the artifacts
    /// inside the range on the way.
    fn harvest(
        &self,
        range: &BuildRange,
        key: ArtifactKey,
        harvest: &mut HashSet<ArtifactKey>,
        visited: &mut HashSet<ArtifactKey>,
    ) -> bool {
        if !visited.insert(key) {
            return harvest.contains(&key);
        }
        let artifact = self.resolution.artifact(key);
        let upper = range.upper_hit(&artifact.id);
        let lower = range.lower_hit(&artifact.id);

        if upper == BoundaryHit::Closed {
            harvest.insert(key);
        }
        match lower {
            BoundaryHit::Closed => {
                harvest.insert(key);
                return true;
            },
            BoundaryHit::Open => return true,
            BoundaryHit::None => {},
        }

        if artifact.dependencies.is_empty() {
            if range.lower.is_none() {
                harvest.insert(key);
                return true;
            }
            return false;
        }

        let mut connected = false;
        for dependency in &artifact.dependencies {
            let Some(solution) = self.resolution.dependency(*dependency).solution else {
                continue;
            };
            if self.harvest(range, solution, harvest, visited) && upper == BoundaryHit::None {
                harvest.insert(key);
                connected = true;
            }
        }
        connected
    }
}

//================================================================================================
// Functions
//================================================================================================

fn incomplete_collator(terminals: &str) -> Reason {
    Reason::new(
        ReasonKind::Incomplete,
        format!("resolution of {terminals} is incomplete"),
    )
}

#[cfg(test)]
mod test;
