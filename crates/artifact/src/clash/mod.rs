//! # Clash Resolution
//!
//! A clash is a set of dependency edges that resolved to different versions
//! of the same group and name. [`resolve_clashes`] picks one winner per clash,
//! redirects every losing edge to it and recomputes the solutions, so that a
//! classpath carries exactly one version of each artifact.
//!
//! The graph keeps the losing artifacts: a redirected edge remembers the
//! artifact it originally resolved to in [`AnalysisDependency::replaced`],
//! which is what tree rendering shows as `(was 1.0)`.
//!
//! [`AnalysisDependency::replaced`]: crate::resolution::AnalysisDependency::replaced

use std::collections::{HashMap, HashSet, VecDeque};

use depot_config::ClashStrategyConfig;
use either::Either;
use serde::Serialize;

use crate::id::{ArtifactIdentification, VersionedArtifactIdentification};
use crate::reason::{Reason, ReasonKind};
use crate::resolution::{AnalysisArtifactResolution, ArtifactKey, DependencyKey, EdgeKind};

//================================================================================================
// Types
//================================================================================================

/// How the winner of a clash is picked.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ClashStrategy {
    /// The highest version wins.
    #[default]
    HighestVersion,
    /// The version declared closest to a terminal wins; declaration order
    /// breaks ties.
    NearestPath,
}

/// One decided clash.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DependencyClash {
    /// Group and name the candidates share.
    pub artifact: ArtifactIdentification,
    /// The winning version.
    pub winner: VersionedArtifactIdentification,
    /// The edge the winner was picked through.
    #[serde(skip)]
    pub winning_dependency: DependencyKey,
    /// Every edge that took part, in declaration order.
    #[serde(skip)]
    pub involved: Vec<DependencyKey>,
    /// The losing versions.
    pub losers: Vec<VersionedArtifactIdentification>,
}

/// Errors of clash resolution.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClashError {
    /// Several versions are equally near to the terminals.
    #[error("cannot decide between {} for {artifact}: equally near to the terminals", joined(.candidates))]
    Ambiguity {
        /// Group and name of the clash.
        artifact: ArtifactIdentification,
        /// The tied versions.
        candidates: Vec<VersionedArtifactIdentification>,
    },
}

/// One candidate version with its best edge.
struct Candidate {
    artifact: ArtifactKey,
    edge: DependencyKey,
    depth: usize,
}

//================================================================================================
// Impls
//================================================================================================

impl From<ClashStrategyConfig> for ClashStrategy {
    fn from(config: ClashStrategyConfig) -> Self {
        match config {
            ClashStrategyConfig::HighestVersion => ClashStrategy::HighestVersion,
            ClashStrategyConfig::NearestPath => ClashStrategy::NearestPath,
        }
    }
}

impl std::str::FromStr for ClashStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "highest-version" => Ok(ClashStrategy::HighestVersion),
            "nearest-path" => Ok(ClashStrategy::NearestPath),
            other => Err(format!("unknown clash strategy `{other}`")),
        }
    }
}

impl ClashError {
    /// The error as a [`Reason`].
    pub fn reason(&self) -> Reason {
        Reason::new(ReasonKind::ClashAmbiguity, self.to_string())
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Decides every clash of `resolution` with `strategy`, redirecting losing
/// edges to the winners and recomputing the solutions.
///
/// With `lenient` unset a [`ClashStrategy::NearestPath`] tie between
/// different versions is an error; otherwise declaration order decides.
pub fn resolve_clashes(
    resolution: &mut AnalysisArtifactResolution,
    strategy: ClashStrategy,
    lenient: bool,
) -> Result<Vec<DependencyClash>, ClashError> {
    let depths = artifact_depths(resolution);

    // edges grouped by group and name, groups in order of first appearance
    let mut order: Vec<ArtifactIdentification> = Vec::new();
    let mut groups: HashMap<ArtifactIdentification, Vec<DependencyKey>> = HashMap::new();
    for (key, dependency) in resolution.dependencies() {
        if !is_solution_edge(dependency.kind) {
            continue;
        }
        let Some(solution) = dependency.solution else {
            continue;
        };
        let id = resolution.artifact(solution).id.artifact.clone();
        groups
            .entry(id.clone())
            .or_insert_with(|| {
                order.push(id);
                Vec::new()
            })
            .push(key);
    }

    let mut clashes = Vec::new();
    for id in order {
        let Some(edges) = groups.remove(&id) else {
            continue;
        };
        let candidates = collect_candidates(resolution, &edges, &depths);
        if candidates.len() < 2 {
            continue;
        }

        let winner = pick(resolution, &id, &candidates, strategy, lenient)?;
        let winner_id = resolution.artifact(winner.artifact).id.clone();
        tracing::debug!(
            message = "clash decided",
            artifact = %id,
            winner = %winner_id,
            candidates = candidates.len()
        );

        for edge in &edges {
            redirect(resolution, *edge, winner.artifact);
        }
        clashes.push(DependencyClash {
            artifact: id,
            winner: winner_id,
            winning_dependency: winner.edge,
            involved: edges,
            losers: candidates
                .iter()
                .filter(|c| c.artifact != winner.artifact)
                .map(|c| resolution.artifact(c.artifact).id.clone())
                .collect(),
        });
    }

    if !clashes.is_empty() {
        let reachable = reachable(resolution);
        resolution.solutions.retain(|k| reachable.contains(k));
    }
    resolution.clashes = clashes.clone();
    Ok(clashes)
}

fn is_solution_edge(kind: EdgeKind) -> bool {
    matches!(kind, EdgeKind::Standard | EdgeKind::Relocation)
}

/// Shortest distance of every reachable artifact from the terminals.
fn artifact_depths(resolution: &AnalysisArtifactResolution) -> HashMap<ArtifactKey, usize> {
    let mut depths = HashMap::new();
    let mut queue = VecDeque::new();
    for key in resolution.terminal_artifacts() {
        if depths.insert(key, 0).is_none() {
            queue.push_back(key);
        }
    }
    while let Some(key) = queue.pop_front() {
        let depth = depths[&key];
        let artifact = resolution.artifact(key);
        for edge in artifact.relocation.iter().chain(artifact.dependencies.iter()) {
            if let Some(solution) = resolution.dependency(*edge).solution {
                if !depths.contains_key(&solution) {
                    depths.insert(solution, depth + 1);
                    queue.push_back(solution);
                }
            }
        }
    }
    depths
}

/// The distinct versions among `edges`, each with its nearest edge.
fn collect_candidates(
    resolution: &AnalysisArtifactResolution,
    edges: &[DependencyKey],
    depths: &HashMap<ArtifactKey, usize>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();
    for edge in edges {
        let dependency = resolution.dependency(*edge);
        let Some(artifact) = dependency.solution else {
            continue;
        };
        let depth = match dependency.depender {
            Some(depender) => depths.get(&depender).map_or(usize::MAX, |d| d + 1),
            None => 0,
        };
        match candidates.iter_mut().find(|c| c.artifact == artifact) {
            Some(known) if depth < known.depth => {
                known.edge = *edge;
                known.depth = depth;
            },
            Some(_) => {},
            None => candidates.push(Candidate {
                artifact,
                edge: *edge,
                depth,
            }),
        }
    }
    candidates
}

fn pick<'c>(
    resolution: &AnalysisArtifactResolution,
    id: &ArtifactIdentification,
    candidates: &'c [Candidate],
    strategy: ClashStrategy,
    lenient: bool,
) -> Result<&'c Candidate, ClashError> {
    let mut winner = &candidates[0];
    match strategy {
        ClashStrategy::HighestVersion => {
            for candidate in &candidates[1..] {
                let version = &resolution.artifact(candidate.artifact).id.version;
                if *version > resolution.artifact(winner.artifact).id.version {
                    winner = candidate;
                }
            }
        },
        ClashStrategy::NearestPath => {
            for candidate in &candidates[1..] {
                if candidate.depth < winner.depth {
                    winner = candidate;
                }
            }
            let tied: Vec<&Candidate> = candidates
                .iter()
                .filter(|c| c.depth == winner.depth)
                .collect();
            if !lenient && tied.len() > 1 {
                return Err(ClashError::Ambiguity {
                    artifact: id.clone(),
                    candidates: tied
                        .iter()
                        .map(|c| resolution.artifact(c.artifact).id.clone())
                        .collect(),
                });
            }
        },
    }
    Ok(winner)
}

fn redirect(resolution: &mut AnalysisArtifactResolution, edge: DependencyKey, winner: ArtifactKey) {
    let Some(old) = resolution.dependency(edge).solution else {
        return;
    };
    if old == winner {
        return;
    }
    let dependency = resolution.dependency_mut(edge);
    dependency.replaced = Some(old);
    dependency.solution = Some(winner);
    resolution.artifact_mut(old).dependers.retain(|d| *d != edge);
    resolution.artifact_mut(winner).dependers.push(edge);
}

fn joined(candidates: &[VersionedArtifactIdentification]) -> String {
    let names: Vec<String> = candidates.iter().map(ToString::to_string).collect();
    names.join(", ")
}

/// Artifacts reachable from the terminals through solution edges.
fn reachable(resolution: &AnalysisArtifactResolution) -> HashSet<ArtifactKey> {
    let mut seen = HashSet::new();
    let mut stack: Vec<ArtifactKey> = resolution
        .terminals()
        .iter()
        .filter_map(|t| match t {
            Either::Left(d) => resolution.dependency(*d).solution,
            Either::Right(a) => Some(*a),
        })
        .collect();
    while let Some(key) = stack.pop() {
        if !seen.insert(key) {
            continue;
        }
        let artifact = resolution.artifact(key);
        for edge in artifact.relocation.iter().chain(artifact.dependencies.iter()) {
            if let Some(solution) = resolution.dependency(*edge).solution {
                stack.push(solution);
            }
        }
    }
    seen
}

#[cfg(test)]
mod test;
