//! Configuration of one transitive resolution.

use std::fmt;
use std::sync::Arc;

use crate::AbortSignal;
use crate::enrich::PartEnrichingContext;
use crate::id::{Dependency, Exclusion, VersionedArtifactIdentification};

/// Decides whether a declared dependency is followed at all.
pub type DependencyFilter = Box<dyn Fn(&Dependency) -> bool + Send + Sync>;

/// Decides whether a resolved artifact is admitted into the graph.
pub type ArtifactPredicate = Box<dyn Fn(&VersionedArtifactIdentification) -> bool + Send + Sync>;

/// Decides whether a dependency is followed given the path that led to it.
pub type PathFilter = Box<dyn FnMut(&DependencyPath<'_>) -> bool + Send>;

/// Tests an artifact against one end of a [`BuildRange`].
pub type Boundary = Arc<dyn Fn(&VersionedArtifactIdentification) -> BoundaryHit + Send + Sync>;

//================================================================================================
// Types
//================================================================================================

/// Everything a [`super::TransitiveResolver`] needs to know besides the
/// terminals. Build one with [`ResolutionContext::builder`].
pub struct ResolutionContext {
    pub(super) dependency_filter: Option<DependencyFilter>,
    pub(super) artifact_filter: Option<ArtifactPredicate>,
    pub(super) path_filter: Option<PathFilter>,
    pub(super) include_parent: bool,
    pub(super) include_imports: bool,
    pub(super) include_relocation: bool,
    pub(super) include_standard: bool,
    pub(super) respect_exclusions: bool,
    pub(super) global_exclusions: Vec<Exclusion>,
    pub(super) lenient: bool,
    pub(super) build_range: Option<BuildRange>,
    pub(super) enrich: Option<PartEnrichingContext>,
    pub(super) abort: AbortSignal,
}

/// Builder for [`ResolutionContext`].
pub struct ResolutionContextBuilder {
    context: ResolutionContext,
}

/// The chain of standard dependency declarations from a terminal down to the
/// candidate being considered, the candidate last.
#[derive(Clone, Copy, Debug)]
pub struct DependencyPath<'a> {
    declarations: &'a [Dependency],
}

/// How an artifact relates to one end of a [`BuildRange`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryHit {
    /// The artifact is not the boundary.
    None,
    /// The artifact is the boundary and excluded from the range.
    Open,
    /// The artifact is the boundary and included in the range.
    Closed,
}

/// Restricts the solutions of a resolution to the artifacts between a lower
/// and an upper boundary, e.g. to rebuild everything between a changed
/// library and the application depending on it.
///
/// Without a lower boundary the range reaches down to the leaves; without an
/// upper boundary it reaches up to the terminals.
#[derive(Clone, Default)]
pub struct BuildRange {
    /// The end towards the leaves.
    pub lower: Option<Boundary>,
    /// The end towards the terminals.
    pub upper: Option<Boundary>,
}

//================================================================================================
// Impls
//================================================================================================

impl ResolutionContext {
    /// Starts from the defaults: every edge kind included, exclusions
    /// respected, lenient, no filters.
    pub fn builder() -> ResolutionContextBuilder {
        ResolutionContextBuilder {
            context: ResolutionContext::default(),
        }
    }

    /// Whether failures are recorded instead of ending the resolution.
    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    /// The signal polled between traversal steps.
    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self {
            dependency_filter: None,
            artifact_filter: None,
            path_filter: None,
            include_parent: true,
            include_imports: true,
            include_relocation: true,
            include_standard: true,
            respect_exclusions: true,
            global_exclusions: Vec::new(),
            lenient: true,
            build_range: None,
            enrich: None,
            abort: AbortSignal::new(),
        }
    }
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("include_parent", &self.include_parent)
            .field("include_imports", &self.include_imports)
            .field("include_relocation", &self.include_relocation)
            .field("include_standard", &self.include_standard)
            .field("respect_exclusions", &self.respect_exclusions)
            .field("global_exclusions", &self.global_exclusions)
            .field("lenient", &self.lenient)
            .field("build_range", &self.build_range.is_some())
            .field("enrich", &self.enrich)
            .finish_non_exhaustive()
    }
}

impl ResolutionContextBuilder {
    /// Follows only the dependencies `filter` accepts.
    pub fn dependency_filter(
        mut self,
        filter: impl Fn(&Dependency) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.context.dependency_filter = Some(Box::new(filter));
        self
    }

    /// Admits only the artifacts `filter` accepts.
    pub fn artifact_filter(
        mut self,
        filter: impl Fn(&VersionedArtifactIdentification) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.context.artifact_filter = Some(Box::new(filter));
        self
    }

    /// Follows only the dependency paths `filter` accepts.
    pub fn path_filter(
        mut self,
        filter: impl FnMut(&DependencyPath<'_>) -> bool + Send + 'static,
    ) -> Self {
        self.context.path_filter = Some(Box::new(filter));
        self
    }

    /// Whether parents become edges of the graph.
    pub fn include_parent(mut self, include: bool) -> Self {
        self.context.include_parent = include;
        self
    }

    /// Whether imports become edges of the graph.
    pub fn include_imports(mut self, include: bool) -> Self {
        self.context.include_imports = include;
        self
    }

    /// Whether relocations become edges; otherwise they are followed silently.
    pub fn include_relocation(mut self, include: bool) -> Self {
        self.context.include_relocation = include;
        self
    }

    /// Whether declared dependencies are followed.
    pub fn include_standard(mut self, include: bool) -> Self {
        self.context.include_standard = include;
        self
    }

    /// Whether exclusions declared on dependencies are honoured.
    pub fn respect_exclusions(mut self, respect: bool) -> Self {
        self.context.respect_exclusions = respect;
        self
    }

    /// Excludes matching artifacts everywhere in the graph.
    pub fn global_exclusions(mut self, exclusions: impl IntoIterator<Item = Exclusion>) -> Self {
        self.context.global_exclusions.extend(exclusions);
        self
    }

    /// Whether failures are recorded instead of ending the resolution.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.context.lenient = lenient;
        self
    }

    /// Restricts the solutions to a build range.
    pub fn build_range(mut self, range: BuildRange) -> Self {
        self.context.build_range = Some(range);
        self
    }

    /// Enriches every solution once the graph is complete.
    pub fn enrich(mut self, enrich: PartEnrichingContext) -> Self {
        self.context.enrich = Some(enrich);
        self
    }

    /// Shares an abort signal with the caller.
    pub fn abort(mut self, abort: AbortSignal) -> Self {
        self.context.abort = abort;
        self
    }

    /// Finishes the context.
    pub fn build(self) -> ResolutionContext {
        self.context
    }
}

impl<'a> DependencyPath<'a> {
    pub(super) fn new(declarations: &'a [Dependency]) -> Self {
        Self { declarations }
    }

    /// Number of dependency edges from the terminal, the candidate included.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Always false; a path holds at least the candidate.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// The dependency being considered.
    pub fn candidate(&self) -> Option<&'a Dependency> {
        self.declarations.last()
    }

    /// The declarations that led to the candidate, terminal first.
    pub fn ancestors(&self) -> &'a [Dependency] {
        match self.declarations.split_last() {
            Some((_, ancestors)) => ancestors,
            None => &[],
        }
    }

    /// Whether the candidate is a terminal or declared by a terminal artifact.
    pub fn is_terminal_dependency(&self) -> bool {
        self.declarations.len() <= 1
    }
}

impl fmt::Display for DependencyPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.declarations.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl BuildRange {
    /// A range without boundaries, harvesting every solution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the boundary towards the leaves.
    pub fn lower(mut self, boundary: Boundary) -> Self {
        self.lower = Some(boundary);
        self
    }

    /// Sets the boundary towards the terminals.
    pub fn upper(mut self, boundary: Boundary) -> Self {
        self.upper = Some(boundary);
        self
    }

    pub(super) fn lower_hit(&self, artifact: &VersionedArtifactIdentification) -> BoundaryHit {
        self.lower.as_ref().map_or(BoundaryHit::None, |b| b(artifact))
    }

    pub(super) fn upper_hit(&self, artifact: &VersionedArtifactIdentification) -> BoundaryHit {
        self.upper.as_ref().map_or(BoundaryHit::None, |b| b(artifact))
    }
}

impl fmt::Debug for BuildRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRange")
            .field("lower", &self.lower.is_some())
            .field("upper", &self.upper.is_some())
            .finish()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// A boundary hit by every artifact `matches` accepts, including it in the
/// range when `inclusive`.
pub fn boundary(
    matches: impl Fn(&VersionedArtifactIdentification) -> bool + Send + Sync + 'static,
    inclusive: bool,
) -> Boundary {
    Arc::new(move |artifact| match (matches(artifact), inclusive) {
        (false, _) => BoundaryHit::None,
        (true, true) => BoundaryHit::Closed,
        (true, false) => BoundaryHit::Open,
    })
}
