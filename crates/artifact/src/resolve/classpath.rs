//! # Classpath Resolution
//!
//! A classpath is a transitive resolution under scope rules, reduced to one
//! version per artifact and enriched with the binary parts the dependers ask
//! for. The scope rules decide per dependency path:
//!
//! | scope     | kept scopes                       | dropped                                   |
//! |-----------|-----------------------------------|-------------------------------------------|
//! | `compile` | compile, provided                 | optional and provided below the terminals |
//! | `runtime` | compile, runtime                  | optional; provided terminals and their twins |
//! | `test`    | compile, provided, runtime, test  | provided; optional and test below the terminals |
//!
//! Only `jar`, `pom` and `bundle` typed dependencies take part. `pom`
//! artifacts carry no binary and are removed from the solutions.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{DependencyPath, ResolutionContext, ResolveError, TerminalSpec, TransitiveResolver};
use crate::AbortSignal;
use crate::clash::{self, ClashStrategy};
use crate::enrich::WantedParts;
use crate::id::{Dependency, Exclusion, PartKey, Scope};
use crate::resolution::{AnalysisArtifactResolution, EdgeKind};

const CLASSPATH_TYPES: [&str; 3] = ["jar", "pom", "bundle"];

//================================================================================================
// Types
//================================================================================================

/// Which classpath to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClasspathScope {
    /// What the terminals compile against.
    #[default]
    Compile,
    /// What the terminals run with.
    Runtime,
    /// What the terminals' tests compile and run with.
    Test,
}

/// Options of a classpath resolution.
#[derive(Clone)]
pub struct ClasspathContext {
    /// The classpath to build.
    pub scope: ClasspathScope,
    /// How version clashes are decided.
    pub strategy: ClashStrategy,
    /// Whether failures are reported in the result instead of as an error.
    pub lenient: bool,
    /// Fetch the binaries the dependers ask for.
    pub enrich_binaries: bool,
    /// Also fetch sources.
    pub enrich_sources: bool,
    /// Also fetch documentation.
    pub enrich_docs: bool,
    /// Artifacts excluded everywhere.
    pub global_exclusions: Vec<Exclusion>,
    /// Additional filter on declared dependencies.
    pub dependency_filter: Option<Arc<dyn Fn(&Dependency) -> bool + Send + Sync>>,
    /// The signal polled while resolving and enriching.
    pub abort: AbortSignal,
}

/// Builds classpaths on top of a [`TransitiveResolver`].
pub struct ClasspathResolver {
    resolver: TransitiveResolver,
}

/// Scope rules of one classpath walk. Runtime walks remember the provided
/// terminals so deeper declarations of the same part are dropped too.
struct ScopeRules {
    scope: ClasspathScope,
    provided: HashSet<(String, String, Option<String>, String)>,
}

//================================================================================================
// Impls
//================================================================================================

impl ClasspathScope {
    fn keeps(self, scope: Scope) -> bool {
        match self {
            ClasspathScope::Compile => matches!(scope, Scope::Compile | Scope::Provided),
            ClasspathScope::Runtime => matches!(scope, Scope::Compile | Scope::Runtime),
            ClasspathScope::Test => matches!(
                scope,
                Scope::Compile | Scope::Provided | Scope::Runtime | Scope::Test
            ),
        }
    }
}

impl fmt::Display for ClasspathScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClasspathScope::Compile => "compile",
            ClasspathScope::Runtime => "runtime",
            ClasspathScope::Test => "test",
        })
    }
}

impl FromStr for ClasspathScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(ClasspathScope::Compile),
            "runtime" => Ok(ClasspathScope::Runtime),
            "test" => Ok(ClasspathScope::Test),
            other => Err(format!("unknown classpath scope `{other}`")),
        }
    }
}

impl Default for ClasspathContext {
    fn default() -> Self {
        let config = depot_config::Config::default();
        Self {
            scope: ClasspathScope::default(),
            strategy: config.resolution.clash_strategy.into(),
            lenient: config.resolution.lenient,
            enrich_binaries: true,
            enrich_sources: false,
            enrich_docs: false,
            global_exclusions: Vec::new(),
            dependency_filter: None,
            abort: AbortSignal::new(),
        }
    }
}

impl fmt::Debug for ClasspathContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClasspathContext")
            .field("scope", &self.scope)
            .field("strategy", &self.strategy)
            .field("lenient", &self.lenient)
            .field("enrich_binaries", &self.enrich_binaries)
            .field("enrich_sources", &self.enrich_sources)
            .field("enrich_docs", &self.enrich_docs)
            .field("global_exclusions", &self.global_exclusions)
            .finish_non_exhaustive()
    }
}

impl ScopeRules {
    fn admits(&mut self, path: &DependencyPath<'_>) -> bool {
        let Some(dependency) = path.candidate() else {
            return true;
        };
        if !CLASSPATH_TYPES.contains(&dependency.kind.as_str()) {
            return false;
        }
        let terminal = path.is_terminal_dependency();

        match self.scope {
            ClasspathScope::Compile => {
                if !terminal && (dependency.optional || dependency.scope == Scope::Provided) {
                    return false;
                }
            },
            ClasspathScope::Test => {
                if dependency.scope == Scope::Provided
                    || (!terminal && (dependency.optional || dependency.scope == Scope::Test))
                {
                    return false;
                }
            },
            ClasspathScope::Runtime => {
                let twin = (
                    dependency.group.clone(),
                    dependency.name.clone(),
                    dependency.classifier.clone(),
                    dependency.kind.clone(),
                );
                if terminal && dependency.scope == Scope::Provided {
                    self.provided.insert(twin);
                    return false;
                }
                if dependency.optional || self.provided.contains(&twin) {
                    return false;
                }
            },
        }
        self.scope.keeps(dependency.scope)
    }
}

impl ClasspathResolver {
    /// Wraps `resolver`.
    pub fn new(resolver: TransitiveResolver) -> Self {
        Self { resolver }
    }

    /// The underlying resolver.
    pub fn resolver(&self) -> &TransitiveResolver {
        &self.resolver
    }

    /// Resolves the classpath of `terminals`.
    pub fn resolve(
        &self,
        context: &ClasspathContext,
        terminals: &[TerminalSpec],
    ) -> Result<AnalysisArtifactResolution, ResolveError> {
        let span = tracing::info_span!("classpath", scope = %context.scope);
        let _enter = span.enter();

        let mut rules = ScopeRules {
            scope: context.scope,
            provided: HashSet::new(),
        };
        let mut builder = ResolutionContext::builder()
            .lenient(true)
            .include_parent(false)
            .include_imports(false)
            .include_relocation(true)
            .global_exclusions(context.global_exclusions.iter().cloned())
            .path_filter(move |path| rules.admits(path))
            .abort(context.abort.clone());
        if let Some(filter) = &context.dependency_filter {
            let filter = Arc::clone(filter);
            builder = builder.dependency_filter(move |d| filter(d));
        }
        let mut resolution = self.resolver.resolve(builder.build(), terminals)?;

        clash::resolve_clashes(&mut resolution, context.strategy, context.lenient)?;

        let keep: Vec<_> = resolution
            .solutions
            .iter()
            .copied()
            .filter(|k| resolution.artifact(*k).packaging != "pom")
            .collect();
        resolution.solutions = keep;

        if context.enrich_binaries || context.enrich_sources || context.enrich_docs {
            self.resolver.enrich_with(
                &mut resolution,
                &context.scope.to_string(),
                &context.abort,
                |resolution, key| {
                    let artifact = resolution.artifact(key);
                    let mut parts = Vec::new();
                    if context.enrich_binaries {
                        for depender in &artifact.dependers {
                            let dependency = resolution.dependency(*depender);
                            if dependency.kind != EdgeKind::Standard
                                || dependency.declaration.kind == "pom"
                            {
                                continue;
                            }
                            let key = PartKey::new(
                                dependency.declaration.classifier.as_deref(),
                                "jar",
                            );
                            if !parts.contains(&key) {
                                parts.push(key);
                            }
                        }
                    }
                    if context.enrich_sources {
                        parts.push(PartKey::sources());
                    }
                    if context.enrich_docs {
                        parts.push(PartKey::docs());
                    }
                    (!parts.is_empty()).then_some(WantedParts::Explicit(parts))
                },
            )?;
        }

        if !context.lenient {
            if let Some(failure) = resolution.failure() {
                return Err(ResolveError::Incomplete(failure.clone()));
            }
        }
        Ok(resolution)
    }
}
