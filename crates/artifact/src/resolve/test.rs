use super::{
    BuildRange, ClasspathContext, ClasspathResolver, ClasspathScope, ResolutionContext,
    ResolveError, TerminalSpec, TransitiveResolver, boundary,
};
use crate::enrich::PartEnrichingContext;
use crate::fixture::{Descriptor, RepoFixture};
use crate::id::{Dependency, Exclusion, PartKey, Scope, VersionedArtifactIdentification};
use crate::model::Relocation;
use crate::reason::ReasonKind;
use crate::resolution::{AnalysisArtifactResolution, EdgeKind};

fn names(resolution: &AnalysisArtifactResolution) -> Vec<String> {
    resolution.solutions().map(|a| a.id.to_string()).collect()
}

fn resolve_with(
    fx: &RepoFixture,
    context: ResolutionContext,
    terminal: &VersionedArtifactIdentification,
) -> anyhow::Result<AnalysisArtifactResolution> {
    let resolver = TransitiveResolver::new(fx.reflection()?);
    Ok(resolver.resolve(context, &[TerminalSpec::Artifact(terminal.clone())])?)
}

fn dependency(coordinate: &str, scope: Scope) -> anyhow::Result<Dependency> {
    Ok(coordinate.parse::<Dependency>()?.with_scope(scope))
}

#[test]
fn diamonds_share_one_solution() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:c#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:a#1.0")?.dep("com.acme:c#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:b#1.0")?.dep("com.acme:c#1.0")?)?;
    let app = fx.publish(
        Descriptor::new("com.acme:app#1.0")?
            .dep("com.acme:a#1.0")?
            .dep("com.acme:b#1.0")?,
    )?;

    let resolution = resolve_with(&fx, ResolutionContext::default(), &app)?;
    assert_eq!(names(&resolution), [
        "com.acme:c#1.0",
        "com.acme:a#1.0",
        "com.acme:b#1.0",
        "com.acme:app#1.0",
    ]);
    let c = resolution
        .get(&"com.acme:c#1.0".parse()?)
        .expect("c is in the graph");
    assert_eq!(c.dependers.len(), 2);
    assert!(!resolution.has_failed());
    Ok(())
}

#[test]
fn dependency_terminals_resolve_ranges() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:lib#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:lib#1.5")?)?;
    fx.publish(Descriptor::new("com.acme:lib#2.0")?)?;

    let resolver = TransitiveResolver::new(fx.reflection()?);
    let terminal = TerminalSpec::Dependency("com.acme:lib#[1.0,2.0)".parse()?);
    let resolution = resolver.resolve(ResolutionContext::default(), &[terminal])?;
    assert_eq!(names(&resolution), ["com.acme:lib#1.5"]);
    assert_eq!(resolution.terminal_artifacts().len(), 1);
    Ok(())
}

#[test]
fn cycles_terminate() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:a#1.0")?.dep("com.acme:b#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:b#1.0")?.dep("com.acme:a#1.0")?)?;
    let a = "com.acme:a#1.0".parse()?;

    let resolution = resolve_with(&fx, ResolutionContext::default(), &a)?;
    assert_eq!(names(&resolution), ["com.acme:b#1.0", "com.acme:a#1.0"]);
    insta::assert_snapshot!(resolution.render(false), @r"
    com.acme:a#1.0
      com.acme:b#1.0 -> com.acme:b#1.0
        com.acme:a#1.0 -> com.acme:a#1.0 (*)
    ");
    Ok(())
}

#[test]
fn parents_and_imports_are_structural_edges() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:parent#1.0")?.packaging("pom"))?;
    fx.publish(Descriptor::new("com.acme:bom#1.0")?.packaging("pom"))?;
    let app = fx.publish(
        Descriptor::new("com.acme:app#1.0")?
            .parent("com.acme:parent#1.0")?
            .import("com.acme:bom#1.0")?,
    )?;

    let resolution = resolve_with(&fx, ResolutionContext::default(), &app)?;
    insta::assert_snapshot!(resolution.render(false), @r"
    com.acme:app#1.0
      com.acme:parent#1.0 (parent) -> com.acme:parent#1.0
      com.acme:bom#1.0 (import) -> com.acme:bom#1.0
    ");
    // reached only structurally, so not solutions
    assert_eq!(names(&resolution), ["com.acme:app#1.0"]);

    let context = ResolutionContext::builder()
        .include_parent(false)
        .include_imports(false)
        .build();
    let resolution = resolve_with(&fx, context, &app)?;
    assert_eq!(resolution.dependencies().count(), 0);
    Ok(())
}

#[test]
fn relocations_are_edges_or_followed() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:new#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:old#1.0")?.relocated(Relocation {
        name: Some("new".to_owned()),
        ..Default::default()
    }))?;
    let app = fx.publish(Descriptor::new("com.acme:app#1.0")?.dep("com.acme:old#1.0")?)?;

    let resolution = resolve_with(&fx, ResolutionContext::default(), &app)?;
    assert_eq!(names(&resolution), [
        "com.acme:new#1.0",
        "com.acme:old#1.0",
        "com.acme:app#1.0",
    ]);
    let old = resolution
        .get(&"com.acme:old#1.0".parse()?)
        .expect("old is in the graph");
    let relocation = old.relocation.expect("relocation edge");
    assert_eq!(resolution.dependency(relocation).kind, EdgeKind::Relocation);

    let context = ResolutionContext::builder().include_relocation(false).build();
    let resolution = resolve_with(&fx, context, &app)?;
    assert_eq!(names(&resolution), ["com.acme:new#1.0", "com.acme:app#1.0"]);
    insta::assert_snapshot!(resolution.render(false), @r"
    com.acme:app#1.0
      com.acme:old#1.0 -> com.acme:new#1.0
    ");
    Ok(())
}

#[test]
fn exclusions_apply_to_the_subtree() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:x#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:y#1.0")?)?;
    fx.publish(Descriptor::new("org.other:z#1.0")?)?;
    fx.publish(
        Descriptor::new("com.acme:a#1.0")?
            .dep("com.acme:x#1.0")?
            .dep("com.acme:y#1.0")?
            .dep("org.other:z#1.0")?,
    )?;
    let a: Dependency = "com.acme:a#1.0".parse()?;
    let app = fx.publish(
        Descriptor::new("com.acme:app#1.0")?.depends(a.excluding(Exclusion::new("com.acme", "x"))),
    )?;

    let context = ResolutionContext::builder()
        .global_exclusions([Exclusion::new("org.other", "*")])
        .build();
    let resolution = resolve_with(&fx, context, &app)?;
    assert_eq!(names(&resolution), [
        "com.acme:y#1.0",
        "com.acme:a#1.0",
        "com.acme:app#1.0",
    ]);
    let filtered: Vec<String> = resolution
        .filtered()
        .iter()
        .map(|f| f.declaration.to_string())
        .collect();
    assert_eq!(filtered, ["com.acme:x#1.0", "org.other:z#1.0"]);

    let context = ResolutionContext::builder().respect_exclusions(false).build();
    let resolution = resolve_with(&fx, context, &app)?;
    assert_eq!(resolution.solutions().count(), 5);
    Ok(())
}

#[test]
fn filters_prune_the_walk() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:deep#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:opt#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:a#1.0")?.dep("com.acme:deep#1.0")?)?;
    let opt: Dependency = "com.acme:opt#1.0".parse()?;
    let app = fx.publish(
        Descriptor::new("com.acme:app#1.0")?
            .dep("com.acme:a#1.0")?
            .depends(opt.optional()),
    )?;

    let context = ResolutionContext::builder()
        .dependency_filter(|d| !d.optional)
        .path_filter(|path| path.len() < 2)
        .build();
    let resolution = resolve_with(&fx, context, &app)?;
    assert_eq!(names(&resolution), ["com.acme:a#1.0", "com.acme:app#1.0"]);
    assert_eq!(resolution.filtered().len(), 2);

    let context = ResolutionContext::builder()
        .artifact_filter(|id| id.name() != "deep")
        .build();
    let resolution = resolve_with(&fx, context, &app)?;
    assert_eq!(names(&resolution), [
        "com.acme:a#1.0",
        "com.acme:opt#1.0",
        "com.acme:app#1.0",
    ]);
    Ok(())
}

#[test]
fn lenient_resolution_collects_failures() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:ok#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:a#1.0")?.dep("com.acme:gone#1.0")?)?;
    let app = fx.publish(
        Descriptor::new("com.acme:app#1.0")?
            .dep("com.acme:ok#1.0")?
            .dep("com.acme:a#1.0")?
            .dep("com.acme:missing#1.0")?,
    )?;

    let resolution = resolve_with(&fx, ResolutionContext::default(), &app)?;
    assert!(resolution.has_failed());
    assert_eq!(resolution.incomplete().len(), 2);
    assert_eq!(names(&resolution), [
        "com.acme:ok#1.0",
        "com.acme:a#1.0",
        "com.acme:app#1.0",
    ]);

    insta::assert_snapshot!(resolution.render(true), @r"
    com.acme:app#1.0 !! [incomplete-artifact] com.acme:app#1.0 has failed dependencies
      com.acme:a#1.0 -> com.acme:a#1.0 !! [incomplete-artifact] com.acme:a#1.0 has failed dependencies
        com.acme:gone#1.0 -> com.acme:gone#1.0 !! [unresolved-artifact] no descriptor of com.acme:gone#1.0 found in any repository
      com.acme:missing#1.0 -> com.acme:missing#1.0 !! [unresolved-artifact] no descriptor of com.acme:missing#1.0 found in any repository
    ");

    let failure = resolution.failure().expect("aggregated failure");
    assert_eq!(failure.kind, ReasonKind::Incomplete);
    let leaves: Vec<ReasonKind> = failure.leaves().iter().map(|r| r.kind).collect();
    assert!(leaves.iter().all(|k| *k == ReasonKind::UnresolvedArtifact));
    Ok(())
}

#[test]
fn strict_resolution_stops_at_the_first_failure() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:lib#1.0")?)?;
    let missing = fx.publish(Descriptor::new("com.acme:app#1.0")?.dep("com.acme:gone#1.0")?)?;
    let ranged = fx.publish(Descriptor::new("com.acme:app#2.0")?.dep("com.acme:lib#[3.0,4.0)")?)?;
    let strict = || ResolutionContext::builder().lenient(false).build();

    let err = resolve_with(&fx, strict(), &missing)
        .expect_err("unresolvable descriptor")
        .downcast::<ResolveError>()?;
    assert!(matches!(err, ResolveError::UnresolvedArtifact { .. }));
    assert_eq!(err.reason().kind, ReasonKind::UnresolvedArtifact);

    let err = resolve_with(&fx, strict(), &ranged)
        .expect_err("unresolvable range")
        .downcast::<ResolveError>()?;
    assert!(matches!(err, ResolveError::Unresolved { .. }));
    assert_eq!(err.reason().kind, ReasonKind::UnresolvedDependency);
    Ok(())
}

#[test]
fn raised_abort_ends_the_walk() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let app = fx.publish(Descriptor::new("com.acme:app#1.0")?)?;
    let context = ResolutionContext::default();
    context.abort_signal().abort();

    let err = resolve_with(&fx, context, &app)
        .expect_err("aborted")
        .downcast::<ResolveError>()?;
    assert!(matches!(err, ResolveError::Aborted));
    Ok(())
}

#[test]
fn build_range_harvests_between_boundaries() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:leaf#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:low#1.0")?.dep("com.acme:leaf#1.0")?)?;
    fx.publish(Descriptor::new("com.acme:side#1.0")?)?;
    fx.publish(
        Descriptor::new("com.acme:mid#1.0")?
            .dep("com.acme:low#1.0")?
            .dep("com.acme:side#1.0")?,
    )?;
    let app = fx.publish(Descriptor::new("com.acme:app#1.0")?.dep("com.acme:mid#1.0")?)?;
    let is = |name: &'static str| move |id: &VersionedArtifactIdentification| id.name() == name;

    let inclusive = ResolutionContext::builder()
        .build_range(BuildRange::new().lower(boundary(is("low"), true)))
        .build();
    let resolution = resolve_with(&fx, inclusive, &app)?;
    assert_eq!(names(&resolution), [
        "com.acme:low#1.0",
        "com.acme:mid#1.0",
        "com.acme:app#1.0",
    ]);

    let exclusive = ResolutionContext::builder()
        .build_range(
            BuildRange::new()
                .lower(boundary(is("low"), false))
                .upper(boundary(is("mid"), true)),
        )
        .build();
    let resolution = resolve_with(&fx, exclusive, &app)?;
    assert_eq!(names(&resolution), ["com.acme:mid#1.0"]);

    let unbounded = ResolutionContext::builder()
        .build_range(BuildRange::new())
        .build();
    let resolution = resolve_with(&fx, unbounded, &app)?;
    assert_eq!(resolution.solutions().count(), 5);
    Ok(())
}

#[test]
fn enrichment_context_fetches_parts() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:lib#1.0")?)?;
    let app = fx.publish(Descriptor::new("com.acme:app#1.0")?.dep("com.acme:lib#1.0")?)?;

    let context = ResolutionContext::builder()
        .enrich(PartEnrichingContext::new("compile", vec![PartKey::binary()]))
        .build();
    let resolution = resolve_with(&fx, context, &app)?;
    for solution in resolution.solutions() {
        let part = solution
            .solution()
            .part(&PartKey::binary())
            .expect("binary was fetched");
        assert_eq!(
            std::fs::read_to_string(&part.location)?,
            format!("binary of {}", solution.id)
        );
    }
    Ok(())
}

#[tokio::test]
async fn enrichment_runs_inside_an_async_runtime() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    fx.publish(Descriptor::new("com.acme:lib#1.0")?)?;
    let app = fx.publish(Descriptor::new("com.acme:app#1.0")?.dep("com.acme:lib#1.0")?)?;

    let context = ResolutionContext::builder()
        .enrich(PartEnrichingContext::new("compile", vec![PartKey::binary()]))
        .build();
    let resolution = resolve_with(&fx, context, &app)?;
    assert!(!resolution.has_failed());
    assert!(
        resolution
            .solutions()
            .all(|s| s.solution().part(&PartKey::binary()).is_some())
    );
    Ok(())
}

/// app declares a provided p, a, a test t and a pom; a brings optional,
/// provided, runtime and compile dependencies of its own, p among them.
fn scoped(fx: &RepoFixture) -> anyhow::Result<VersionedArtifactIdentification> {
    for name in ["o", "q", "r", "c", "p", "t"] {
        fx.publish(Descriptor::new(&format!("com.acme:{name}#1.0"))?)?;
    }
    fx.publish(Descriptor::new("com.acme:bom#1.0")?.packaging("pom"))?;
    fx.publish(
        Descriptor::new("com.acme:a#1.0")?
            .depends(dependency("com.acme:o#1.0", Scope::Compile)?.optional())
            .depends(dependency("com.acme:q#1.0", Scope::Provided)?)
            .depends(dependency("com.acme:r#1.0", Scope::Runtime)?)
            .depends(dependency("com.acme:c#1.0", Scope::Compile)?)
            .depends(dependency("com.acme:p#1.0", Scope::Compile)?),
    )?;
    let mut bom = dependency("com.acme:bom#1.0", Scope::Compile)?;
    bom.kind = "pom".to_owned();
    fx.publish(
        Descriptor::new("com.acme:app#1.0")?
            .depends(dependency("com.acme:p#1.0", Scope::Provided)?)
            .depends(dependency("com.acme:a#1.0", Scope::Compile)?)
            .depends(dependency("com.acme:t#1.0", Scope::Test)?)
            .depends(bom),
    )
}

fn classpath(
    fx: &RepoFixture,
    app: &VersionedArtifactIdentification,
    scope: ClasspathScope,
) -> anyhow::Result<AnalysisArtifactResolution> {
    let resolver = ClasspathResolver::new(TransitiveResolver::new(fx.reflection()?));
    let context = ClasspathContext {
        scope,
        ..Default::default()
    };
    Ok(resolver.resolve(&context, &[TerminalSpec::Artifact(app.clone())])?)
}

#[test]
fn compile_classpath() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let app = scoped(&fx)?;
    let resolution = classpath(&fx, &app, ClasspathScope::Compile)?;
    assert_eq!(names(&resolution), [
        "com.acme:p#1.0",
        "com.acme:c#1.0",
        "com.acme:a#1.0",
        "com.acme:app#1.0",
    ]);

    let a = resolution
        .get(&"com.acme:a#1.0".parse()?)
        .expect("a is in the graph");
    assert!(a.solution().has_part(&PartKey::binary()));
    Ok(())
}

#[test]
fn runtime_classpath_drops_provided_terminals_everywhere() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let app = scoped(&fx)?;
    let resolution = classpath(&fx, &app, ClasspathScope::Runtime)?;
    assert_eq!(names(&resolution), [
        "com.acme:r#1.0",
        "com.acme:c#1.0",
        "com.acme:a#1.0",
        "com.acme:app#1.0",
    ]);
    Ok(())
}

#[test]
fn test_classpath() -> anyhow::Result<()> {
    let fx = RepoFixture::new()?;
    let app = scoped(&fx)?;
    let resolution = classpath(&fx, &app, ClasspathScope::Test)?;
    assert_eq!(names(&resolution), [
        "com.acme:r#1.0",
        "com.acme:c#1.0",
        "com.acme:p#1.0",
        "com.acme:a#1.0",
        "com.acme:t#1.0",
        "com.acme:app#1.0",
    ]);
    Ok(())
}
