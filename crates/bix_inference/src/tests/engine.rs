use super::*;
use crate::config::{BatchMode, InferenceConfig};
use crate::diagnostics::{BuilderDiagnostic, INCOMPATIBLE_CONSTRAINTS};
use crate::error::EngineError;
use crate::finalize::RecordedResults;
use crate::lattice::{LatticeCache, TypeHierarchy};
use crate::solver::FailureKind;
use std::sync::Arc;

fn conflicting_body() -> Vec<Statement> {
    vec![
        Statement::let_("x", Some(named("Float")), call("get", vec![int(2)], 2)),
        Statement::expr(call("add", vec![int(3)], 3)),
    ]
}

#[test]
fn success_is_written_to_type_check_results() {
    let engine = engine();
    let mut results = RecordedResults::new();
    let mut diagnostics: Vec<BuilderDiagnostic> = Vec::new();
    let site = list_site(40, vec![Statement::expr(call("add", vec![int(2)], 2))]);

    let outcome = engine
        .try_infer_into(&site, &mut results, &mut diagnostics)
        .expect("inference");

    assert!(outcome.is_success());
    assert!(diagnostics.is_empty());
    let recorded = results.get(CallSiteId(40)).expect("recorded call");
    assert_eq!(recorded.type_argument("E"), Some(&ty("Int")));
    assert!(recorded
        .expression_types
        .iter()
        .all(|typed| !typed.ty.contains_variables()));
}

#[test]
fn failures_only_reach_the_diagnostics_sink() {
    let engine = engine();
    let mut results = RecordedResults::new();
    let mut diagnostics: Vec<BuilderDiagnostic> = Vec::new();

    let outcome = engine
        .try_infer_into(&list_site(41, conflicting_body()), &mut results, &mut diagnostics)
        .expect("inference");

    assert!(outcome.as_failure().is_some());
    assert!(results.is_empty());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].code, INCOMPATIBLE_CONSTRAINTS);
    assert_eq!(diagnostics[0].kind, FailureKind::IncompatibleConstraints);
    assert_eq!(diagnostics[0].span, Some(at(2)));
    assert_eq!(diagnostics[0].notes.len(), 2);
}

#[test]
fn not_eligible_calls_publish_nothing() {
    let engine = engine();
    let mut results = RecordedResults::new();
    let mut diagnostics: Vec<BuilderDiagnostic> = Vec::new();
    let site = list_site(42, vec![]).with_explicit_type_arguments(vec![named("Int")]);

    engine
        .try_infer_into(&site, &mut results, &mut diagnostics)
        .expect("inference");
    assert!(results.is_empty());
    assert!(diagnostics.is_empty());
}

#[test]
fn mismatched_argument_count_is_an_error() {
    let site = CallSite::new(CallSiteId(43), build_list(), at(1));
    assert_eq!(
        engine().try_infer(&site).unwrap_err(),
        EngineError::ArgumentCountMismatch {
            callee: "buildList".into(),
            expected: 1,
            found: 0,
        }
    );
}

#[test]
fn unknown_member_is_an_error() {
    let site = list_site(44, vec![Statement::expr(call("push", vec![int(2)], 2))]);
    assert!(matches!(
        engine().try_infer(&site),
        Err(EngineError::UnresolvedMember { .. })
    ));
}

#[test]
fn lambda_parameter_out_of_range_is_an_error() {
    let body = vec![Statement::expr(call(
        "add",
        vec![Expression::LambdaParameter {
            index: 0,
            span: at(2),
        }],
        2,
    ))];
    assert_eq!(
        engine().try_infer(&list_site(45, body)).unwrap_err(),
        EngineError::LambdaParameterOutOfRange {
            index: 0,
            available: 0,
        }
    );
}

#[test]
fn telemetry_serializes_to_json() {
    let call = success(
        engine()
            .try_infer(&list_site(46, vec![Statement::expr(call("add", vec![int(2)], 2))]))
            .expect("inference"),
    );
    assert_eq!(call.telemetry.expressions_visited, 2);
    assert_eq!(call.telemetry.constraints_collected, 1);
    assert_eq!(call.telemetry.fixpoint_iterations, 1);

    let json: serde_json::Value =
        serde_json::from_str(&call.telemetry.to_json().expect("json")).expect("parse");
    assert_eq!(json["constraints_collected"], 1);
    assert_eq!(json["universal_uses"], 0);
}

#[test]
fn shared_cache_is_reused_across_sessions() {
    let engine = engine();
    let body = || {
        vec![
            Statement::expr(call("add", vec![int(2)], 2)),
            Statement::expr(call("add", vec![Expression::literal(named("Double"), at(3))], 3)),
        ]
    };
    let first = success(engine.try_infer(&list_site(47, body())).expect("first"));
    let second = success(engine.try_infer(&list_site(48, body())).expect("second"));

    assert_eq!(first.type_argument("E"), Some(&ty("Number")));
    assert_eq!(second.type_argument("E"), Some(&ty("Number")));
    assert!(first.telemetry.cache_misses > 0);
    assert_eq!(second.telemetry.cache_misses, 0);
    assert!(second.telemetry.cache_hits > 0);
    assert!(engine.cache_metrics().hits > 0);
}

#[test]
fn private_caches_start_cold() {
    let hierarchy = Arc::new(TypeHierarchy::standard().expect("standard hierarchy"));
    let engine = BuilderInference::with_config(
        hierarchy,
        InferenceConfig::default().with_shared_lattice_cache(false),
    );
    let body = || {
        vec![
            Statement::expr(call("add", vec![int(2)], 2)),
            Statement::expr(call("add", vec![Expression::literal(named("Double"), at(3))], 3)),
        ]
    };
    engine.try_infer(&list_site(49, body())).expect("first");
    let second = success(engine.try_infer(&list_site(50, body())).expect("second"));
    assert!(second.telemetry.cache_misses > 0);
    assert_eq!(engine.cache_metrics().lookups, 0);
}

#[test]
fn engines_can_share_one_cache() {
    let hierarchy = Arc::new(TypeHierarchy::standard().expect("standard hierarchy"));
    let cache = Arc::new(LatticeCache::new());
    let first = BuilderInference::new(Arc::clone(&hierarchy)).with_shared_cache(Arc::clone(&cache));
    let second = BuilderInference::new(hierarchy).with_shared_cache(Arc::clone(&cache));
    let body = || {
        vec![
            Statement::expr(call("add", vec![int(2)], 2)),
            Statement::expr(call("add", vec![Expression::literal(named("Double"), at(3))], 3)),
        ]
    };

    assert_eq!(cache.metrics().hit_rate(), None);
    first.try_infer(&list_site(51, body())).expect("first");
    assert_eq!(cache.metrics().hit_rate(), Some(0.0));

    let warm = success(second.try_infer(&list_site(52, body())).expect("second"));
    assert_eq!(warm.telemetry.cache_misses, 0);
    assert_eq!(second.cache_metrics(), cache.metrics());
    assert_eq!(cache.metrics().hit_rate(), Some(0.5));
}

#[test]
fn parallel_batches_keep_input_order() {
    let hierarchy = Arc::new(TypeHierarchy::standard().expect("standard hierarchy"));
    let parallel = BuilderInference::with_config(
        hierarchy,
        InferenceConfig::default().with_batch_mode(BatchMode::pooled(4, 2)),
    );
    let sites: Vec<CallSite> = (0..32)
        .map(|index| {
            let literal = if index % 2 == 0 { int(2) } else { string(2) };
            list_site(100 + index, vec![Statement::expr(call("add", vec![literal], 2))])
        })
        .collect();

    let outcomes = parallel.infer_all(&sites);
    let sequential = engine().infer_all(&sites);
    assert_eq!(outcomes.len(), sites.len());

    for (index, (parallel, sequential)) in outcomes.into_iter().zip(sequential).enumerate() {
        let parallel = success(parallel.expect("parallel"));
        let sequential = success(sequential.expect("sequential"));
        assert_eq!(parallel.call_site, CallSiteId(100 + index as u32));
        assert_eq!(parallel.type_arguments, sequential.type_arguments);
    }
}
