//! # Resolution Graph
//!
//! An [`AnalysisArtifactResolution`] is an arena owning every artifact and
//! dependency edge reached from the terminals of one resolution. Edges refer
//! to artifacts by [`ArtifactKey`] and artifacts refer back to the edges that
//! reached them by [`DependencyKey`]; nothing is reference counted and the
//! graph may contain cycles.
//!
//! Each distinct coordinate has exactly one [`AnalysisArtifact`]. The
//! resolution's solutions are the artifacts reached through dependencies, in
//! dependency order: an artifact always comes after everything it depends on.
//!
//! Parts are the one piece of state that changes after resolution. They live
//! in a [`PartMap`] shared with the [`Solution`] handles handed to the
//! enricher, which inserts committed parts under the map's write lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use either::Either;
use serde::{Deserialize, Serialize};

use crate::clash::DependencyClash;
use crate::id::{Dependency, PartKey, VersionedArtifactIdentification};
use crate::model::ArtifactModel;
use crate::reason::Reason;

/// Parts of one solution, shared between the resolution and the enricher.
pub type PartMap = Arc<RwLock<BTreeMap<PartKey, Part>>>;

/// A terminal of a resolution: a dependency to resolve or an artifact given
/// directly.
pub type Terminal = Either<DependencyKey, ArtifactKey>;

//================================================================================================
// Types
//================================================================================================

/// Index of an [`AnalysisArtifact`] in its resolution.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey(pub usize);

/// Index of an [`AnalysisDependency`] in its resolution.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyKey(pub usize);

/// How an edge came into the graph.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    /// Declared in the depender's dependency list, or a terminal.
    Standard,
    /// The depender's parent.
    Parent,
    /// An artifact the depender imports.
    Import,
    /// The artifact the depender was relocated to.
    Relocation,
}

/// A dependency edge.
#[derive(Clone, Debug)]
pub struct AnalysisDependency {
    /// The declaration as written by the depender.
    pub declaration: Dependency,
    /// How the edge came into the graph.
    pub kind: EdgeKind,
    /// The declaring artifact, `None` for terminals.
    pub depender: Option<ArtifactKey>,
    /// The artifact satisfying the dependency.
    pub solution: Option<ArtifactKey>,
    /// The originally resolved artifact when a clash redirected the edge.
    pub replaced: Option<ArtifactKey>,
    /// Why the dependency could not be resolved.
    pub failure: Option<Reason>,
    /// Distance from the terminals, terminals being at depth 0.
    pub depth: usize,
}

/// An artifact node.
#[derive(Clone, Debug)]
pub struct AnalysisArtifact {
    /// The coordinate.
    pub id: VersionedArtifactIdentification,
    /// Packaging from the descriptor, `jar` when unknown.
    pub packaging: String,
    /// The descriptor, when it could be read.
    pub model: Option<Arc<ArtifactModel>>,
    /// Standard dependencies in declaration order.
    pub dependencies: Vec<DependencyKey>,
    /// Every edge that resolved to this artifact.
    pub dependers: Vec<DependencyKey>,
    /// Edge to the parent.
    pub parent: Option<DependencyKey>,
    /// Edges to imported artifacts.
    pub imports: Vec<DependencyKey>,
    /// Edge to the relocation target.
    pub relocation: Option<DependencyKey>,
    /// Committed parts.
    pub parts: PartMap,
    /// Why the artifact is unusable or incomplete.
    pub failure: Option<Reason>,
    /// Order of first encounter.
    pub visit_order: usize,
    /// Position in dependency order, once fully expanded.
    pub dependency_order: Option<usize>,
}

/// One physical file of a solution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Part {
    /// Classifier and type.
    pub key: PartKey,
    /// Final location in the local repository.
    pub location: PathBuf,
    /// The repository that served it, `None` when adopted from disk.
    pub repository: Option<String>,
}

/// A handle on a solution that can be sent to enrichment workers.
#[derive(Clone, Debug)]
pub struct Solution {
    /// The coordinate.
    pub id: VersionedArtifactIdentification,
    /// The shared part map.
    pub parts: PartMap,
}

/// A dependency rejected by a filter before resolution.
#[derive(Clone, Debug)]
pub struct FilteredDependency {
    /// The declaring artifact, `None` for terminals.
    pub depender: Option<ArtifactKey>,
    /// The rejected declaration.
    pub declaration: Dependency,
}

/// The result of a resolution. Always structurally valid; failures are
/// recorded on the nodes they concern and aggregated in [`Self::failure`].
#[derive(Clone, Debug, Default)]
pub struct AnalysisArtifactResolution {
    pub(crate) artifacts: Vec<AnalysisArtifact>,
    pub(crate) dependencies: Vec<AnalysisDependency>,
    pub(crate) index: HashMap<VersionedArtifactIdentification, ArtifactKey>,
    pub(crate) terminals: Vec<Terminal>,
    pub(crate) solutions: Vec<ArtifactKey>,
    pub(crate) clashes: Vec<DependencyClash>,
    pub(crate) filtered: Vec<FilteredDependency>,
    pub(crate) incomplete: Vec<ArtifactKey>,
    pub(crate) contended: Vec<ArtifactKey>,
    pub(crate) failure: Option<Reason>,
}

//================================================================================================
// Impls
//================================================================================================

impl AnalysisArtifact {
    pub(crate) fn new(id: VersionedArtifactIdentification, visit_order: usize) -> Self {
        Self {
            id,
            packaging: String::from("jar"),
            model: None,
            dependencies: Vec::new(),
            dependers: Vec::new(),
            parent: None,
            imports: Vec::new(),
            relocation: None,
            parts: PartMap::default(),
            failure: None,
            visit_order,
            dependency_order: None,
        }
    }

    /// A handle sharing this artifact's part map.
    pub fn solution(&self) -> Solution {
        Solution {
            id: self.id.clone(),
            parts: Arc::clone(&self.parts),
        }
    }

    /// Every outgoing edge: parent, imports, relocation, then standard ones.
    pub fn edges(&self) -> impl Iterator<Item = DependencyKey> + '_ {
        self.parent
            .iter()
            .chain(self.imports.iter())
            .chain(self.relocation.iter())
            .chain(self.dependencies.iter())
            .copied()
    }
}

impl Solution {
    /// A snapshot of the committed parts.
    pub fn parts(&self) -> Vec<Part> {
        self.parts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Whether `key` has been committed.
    pub fn has_part(&self, key: &PartKey) -> bool {
        self.parts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// The committed part `key`.
    pub fn part(&self, key: &PartKey) -> Option<Part> {
        self.parts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl AnalysisArtifactResolution {
    pub(crate) fn add_artifact(&mut self, id: VersionedArtifactIdentification) -> ArtifactKey {
        let key = ArtifactKey(self.artifacts.len());
        self.index.insert(id.clone(), key);
        self.artifacts.push(AnalysisArtifact::new(id, key.0));
        key
    }

    pub(crate) fn add_dependency(&mut self, dependency: AnalysisDependency) -> DependencyKey {
        let key = DependencyKey(self.dependencies.len());
        self.dependencies.push(dependency);
        key
    }

    pub(crate) fn artifact_mut(&mut self, key: ArtifactKey) -> &mut AnalysisArtifact {
        &mut self.artifacts[key.0]
    }

    pub(crate) fn dependency_mut(&mut self, key: DependencyKey) -> &mut AnalysisDependency {
        &mut self.dependencies[key.0]
    }

    /// The artifact behind `key`.
    pub fn artifact(&self, key: ArtifactKey) -> &AnalysisArtifact {
        &self.artifacts[key.0]
    }

    /// The dependency behind `key`.
    pub fn dependency(&self, key: DependencyKey) -> &AnalysisDependency {
        &self.dependencies[key.0]
    }

    /// Every artifact, in order of first encounter.
    pub fn artifacts(&self) -> impl Iterator<Item = (ArtifactKey, &AnalysisArtifact)> {
        self.artifacts
            .iter()
            .enumerate()
            .map(|(i, a)| (ArtifactKey(i), a))
    }

    /// Every dependency edge.
    pub fn dependencies(&self) -> impl Iterator<Item = (DependencyKey, &AnalysisDependency)> {
        self.dependencies
            .iter()
            .enumerate()
            .map(|(i, d)| (DependencyKey(i), d))
    }

    /// Looks up the artifact of a coordinate.
    pub fn lookup(&self, id: &VersionedArtifactIdentification) -> Option<ArtifactKey> {
        self.index.get(id).copied()
    }

    /// The artifact of a coordinate.
    pub fn get(&self, id: &VersionedArtifactIdentification) -> Option<&AnalysisArtifact> {
        self.lookup(id).map(|k| self.artifact(k))
    }

    /// The terminals in the order given.
    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    /// Artifacts the terminals stand for, skipping unresolved terminal
    /// dependencies.
    pub fn terminal_artifacts(&self) -> Vec<ArtifactKey> {
        self.terminals
            .iter()
            .filter_map(|t| match t {
                Either::Left(d) => self.dependency(*d).solution,
                Either::Right(a) => Some(*a),
            })
            .collect()
    }

    /// The solutions in dependency order.
    pub fn solutions(&self) -> impl Iterator<Item = &AnalysisArtifact> {
        self.solutions.iter().map(|k| self.artifact(*k))
    }

    /// Keys of the solutions in dependency order.
    pub fn solution_keys(&self) -> &[ArtifactKey] {
        &self.solutions
    }

    /// Clashes found by clash resolution.
    pub fn clashes(&self) -> &[DependencyClash] {
        &self.clashes
    }

    /// Dependencies rejected by a filter.
    pub fn filtered(&self) -> &[FilteredDependency] {
        &self.filtered
    }

    /// Dependencies that did not resolve.
    pub fn unresolved(&self) -> Vec<DependencyKey> {
        self.dependencies()
            .filter(|(_, d)| d.solution.is_none() && d.failure.is_some())
            .map(|(k, _)| k)
            .collect()
    }

    /// Artifacts with failed dependencies.
    pub fn incomplete(&self) -> &[ArtifactKey] {
        &self.incomplete
    }

    /// Solutions the last enrichment skipped because another thread or
    /// process held their lock. Their parts may be missing.
    pub fn contended(&self) -> &[ArtifactKey] {
        &self.contended
    }

    /// The aggregated failure.
    pub fn failure(&self) -> Option<&Reason> {
        self.failure.as_ref()
    }

    /// Whether anything failed.
    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Renders the graph as an indented tree, optionally trimmed to the paths
    /// that lead to a failure.
    pub fn render(&self, failures_only: bool) -> String {
        let mut out = String::new();
        let mut failing = HashMap::new();
        let mut expanded = HashSet::new();

        for terminal in &self.terminals {
            match terminal {
                Either::Left(dep) => {
                    if failures_only && !self.edge_fails(*dep, &mut failing) {
                        continue;
                    }
                    self.render_edge(
                        *dep,
                        0,
                        failures_only,
                        &mut failing,
                        &mut expanded,
                        &mut out,
                    );
                },
                Either::Right(art) => {
                    if failures_only && !self.subtree_fails(*art, &mut failing) {
                        continue;
                    }
                    self.render_artifact(*art, 0, &mut out);
                    self.render_children(
                        *art,
                        1,
                        failures_only,
                        &mut failing,
                        &mut expanded,
                        &mut out,
                    );
                },
            }
        }
        out
    }

    fn render_artifact(&self, key: ArtifactKey, depth: usize, out: &mut String) {
        let artifact = self.artifact(key);
        let _ = write!(out, "{}{}", "  ".repeat(depth), artifact.id);
        if let Some(f) = &artifact.failure {
            let _ = write!(out, " !! [{}] {}", f.kind, f.text);
        }
        out.push('\n');
    }

    fn render_children(
        &self,
        key: ArtifactKey,
        depth: usize,
        failures_only: bool,
        failing: &mut HashMap<ArtifactKey, bool>,
        expanded: &mut HashSet<ArtifactKey>,
        out: &mut String,
    ) {
        if !expanded.insert(key) {
            return;
        }
        let edges: Vec<_> = self.artifact(key).edges().collect();
        for edge in edges {
            if failures_only && !self.edge_fails(edge, failing) {
                continue;
            }
            self.render_edge(edge, depth, failures_only, failing, expanded, out);
        }
    }

    fn render_edge(
        &self,
        key: DependencyKey,
        depth: usize,
        failures_only: bool,
        failing: &mut HashMap<ArtifactKey, bool>,
        expanded: &mut HashSet<ArtifactKey>,
        out: &mut String,
    ) {
        let dep = self.dependency(key);
        let _ = write!(out, "{}{}", "  ".repeat(depth), dep.declaration);
        match dep.kind {
            EdgeKind::Standard => {},
            EdgeKind::Parent => out.push_str(" (parent)"),
            EdgeKind::Import => out.push_str(" (import)"),
            EdgeKind::Relocation => out.push_str(" (relocation)"),
        }

        match (dep.solution, &dep.failure) {
            (Some(solution), _) => {
                let artifact = self.artifact(solution);
                let _ = write!(out, " -> {}", artifact.id);
                if let Some(old) = dep.replaced {
                    let _ = write!(out, " (was {})", self.artifact(old).id.version);
                }
                let seen = expanded.contains(&solution);
                if let Some(f) = &artifact.failure {
                    let _ = write!(out, " !! [{}] {}", f.kind, f.text);
                }
                if seen && artifact.edges().next().is_some() {
                    out.push_str(" (*)");
                }
                out.push('\n');
                if !seen {
                    self.render_children(
                        solution,
                        depth + 1,
                        failures_only,
                        failing,
                        expanded,
                        out,
                    );
                }
            },
            (None, Some(f)) => {
                let _ = writeln!(out, " !! [{}] {}", f.kind, f.text);
            },
            (None, None) => out.push('\n'),
        }
    }

    fn edge_fails(&self, key: DependencyKey, failing: &mut HashMap<ArtifactKey, bool>) -> bool {
        let dep = self.dependency(key);
        match dep.solution {
            Some(s) => self.subtree_fails(s, failing),
            None => dep.failure.is_some(),
        }
    }

    fn subtree_fails(&self, key: ArtifactKey, failing: &mut HashMap<ArtifactKey, bool>) -> bool {
        if let Some(known) = failing.get(&key) {
            return *known;
        }
        // provisional answer for cycles
        failing.insert(key, false);
        let artifact = self.artifact(key);
        let fails = artifact.failure.is_some()
            || artifact
                .edges()
                .collect::<Vec<_>>()
                .into_iter()
                .any(|e| self.edge_fails(e, failing));
        failing.insert(key, fails);
        fails
    }
}

impl fmt::Display for AnalysisArtifactResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}
