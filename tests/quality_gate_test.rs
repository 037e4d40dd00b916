mod helpers;

use chrono::{DateTime, Duration, Utc};
use helpers::{fixed_now, seed_events, tenant, test_storage, Outcome};
use recallgate::config::RolloutSettings;
use recallgate::memory::types::Scope;
use recallgate::rollout::metrics::compute_windows;
use recallgate::rollout::policy::{evaluate_gate, evaluate_rollout};
use recallgate::rollout::quality_gate::{reason_codes, GateStatus, QualityGateResult};
use recallgate::rollout::types::RolloutMode;
use recallgate::storage::{SqliteStorage, TelemetrySink};

fn daily_gate(
    storage: &SqliteStorage,
    scope: &Scope,
    mode: RolloutMode,
    now: DateTime<Utc>,
) -> QualityGateResult {
    evaluate_gate(storage, scope, &RolloutSettings::default(), mode, 24, now).unwrap()
}

#[test]
fn windows_split_on_exact_boundary() {
    let storage = test_storage();
    let scope = tenant("acme");
    let now = fixed_now();

    // Exactly at the current window start belongs to the previous window
    let at = now - Duration::hours(24);
    seed_events(&storage, &scope, RolloutMode::Canary, at, Outcome::Expanded(1), 1);
    // Newest event is included
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::Expanded(1), 1);
    // Exactly two windows back is outside both
    let at = now - Duration::hours(48);
    seed_events(&storage, &scope, RolloutMode::Canary, at, Outcome::Expanded(1), 1);
    // In the future
    let at = now + Duration::seconds(1);
    seed_events(&storage, &scope, RolloutMode::Canary, at, Outcome::Expanded(1), 1);

    let windows = compute_windows(&storage, &scope, now, 24).unwrap();
    assert_eq!(windows.current.total_requests, 1);
    assert_eq!(windows.previous.total_requests, 1);
}

#[test]
fn windows_are_per_tenant() {
    let storage = test_storage();
    let now = fixed_now();
    seed_events(&storage, &tenant("acme"), RolloutMode::Canary, now, Outcome::Expanded(2), 5);
    seed_events(&storage, &tenant("globex"), RolloutMode::Canary, now, Outcome::GraphError, 3);

    let acme = compute_windows(&storage, &tenant("acme"), now, 24).unwrap();
    assert_eq!(acme.current.total_requests, 5);
    assert_eq!(acme.current.graph_error_fallbacks, 0);

    let globex = compute_windows(&storage, &tenant("globex"), now, 24).unwrap();
    assert_eq!(globex.current.graph_error_fallbacks, 3);
}

#[test]
fn evaluate_rejects_out_of_range_windows() {
    let storage = test_storage();
    let scope = tenant("acme");
    let settings = RolloutSettings::default();
    seed_events(&storage, &scope, RolloutMode::Canary, fixed_now(), Outcome::Expanded(1), 3);

    for hours in [0, 8761, u32::MAX] {
        let err =
            evaluate_rollout(&storage, &scope, &settings, Some(hours), fixed_now()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.code(), "INVALID_WINDOW");
    }

    let plan = evaluate_rollout(&storage, &scope, &settings, Some(8760), fixed_now()).unwrap();
    assert_eq!(plan.quality_gate.window_hours, 8760);
}

#[test]
fn healthy_canary_traffic_passes() {
    let storage = test_storage();
    let scope = tenant("acme");
    let now = fixed_now();
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::Expanded(2), 20);

    let gate = daily_gate(&storage, &scope, RolloutMode::Canary, now);
    assert_eq!(gate.status, GateStatus::Pass);
    assert!(gate.reasons.is_empty());
    assert!(!gate.canary_blocked);
    assert_eq!(gate.current.expansion_coverage_rate, 1.0);
    assert!((gate.current.avg_candidate_lift - 2.0).abs() < 1e-9);
}

#[test]
fn graph_errors_fail_the_gate() {
    let storage = test_storage();
    let scope = tenant("acme");
    let now = fixed_now();
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::Expanded(2), 15);
    let at = now - Duration::minutes(5);
    seed_events(&storage, &scope, RolloutMode::Canary, at, Outcome::GraphError, 5);

    let gate = daily_gate(&storage, &scope, RolloutMode::Canary, now);
    assert_eq!(gate.status, GateStatus::Fail);
    assert!(gate.canary_blocked);
    assert_eq!(
        gate.blocking_codes(),
        vec![
            reason_codes::FALLBACK_RATE_ABOVE_LIMIT.to_string(),
            reason_codes::GRAPH_ERROR_RATE_ABOVE_LIMIT.to_string(),
        ]
    );
    assert!((gate.current.fallback_rate - 0.25).abs() < 1e-9);
}

#[test]
fn timeouts_count_as_fallbacks_but_not_graph_errors() {
    let storage = test_storage();
    let scope = tenant("acme");
    let now = fixed_now();
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::Expanded(2), 16);
    let at = now - Duration::minutes(5);
    seed_events(&storage, &scope, RolloutMode::Canary, at, Outcome::Timeout, 4);

    let gate = daily_gate(&storage, &scope, RolloutMode::Canary, now);
    assert_eq!(gate.current.hybrid_fallbacks, 4);
    assert_eq!(gate.current.graph_error_fallbacks, 0);
    assert_eq!(gate.status, GateStatus::Fail);
    assert_eq!(gate.blocking_codes(), vec![reason_codes::FALLBACK_RATE_ABOVE_LIMIT.to_string()]);
}

#[test]
fn too_few_hybrid_requests_is_insufficient_data() {
    let storage = test_storage();
    let scope = tenant("acme");
    let now = fixed_now();
    // Failures would trip the gate if there were enough of them
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::GraphError, 19);

    let gate = daily_gate(&storage, &scope, RolloutMode::Canary, now);
    assert_eq!(gate.status, GateStatus::InsufficientData);
    assert!(gate.reasons.is_empty());
}

#[test]
fn lexical_traffic_does_not_count_as_hybrid() {
    let storage = test_storage();
    let scope = tenant("acme");
    let now = fixed_now();
    for i in 0..30 {
        let at = now - Duration::seconds(i);
        let mut event = helpers::hybrid_event(RolloutMode::Off, at, Outcome::Expanded(0));
        event.requested_strategy = None;
        event.applied_strategy = recallgate::rollout::strategy::Strategy::Lexical;
        storage.record_event(&scope, &event).unwrap();
    }

    let gate = daily_gate(&storage, &scope, RolloutMode::Off, now);
    assert_eq!(gate.current.total_requests, 30);
    assert_eq!(gate.current.hybrid_requested, 0);
    assert_eq!(gate.status, GateStatus::InsufficientData);
}

#[test]
fn shadow_traffic_warns_on_canary_samples() {
    let storage = test_storage();
    let scope = tenant("acme");
    let now = fixed_now();
    seed_events(&storage, &scope, RolloutMode::Shadow, now, Outcome::Expanded(3), 25);

    let gate = daily_gate(&storage, &scope, RolloutMode::Shadow, now);
    assert_eq!(gate.status, GateStatus::Warn);
    let codes: Vec<&str> = gate.reasons.iter().map(|r| r.code).collect();
    assert!(codes.contains(&reason_codes::MIN_CANARY_SAMPLES_NOT_MET));
    assert_eq!(gate.current.shadow_executions, 25);
    assert!((gate.current.shadow_avg_graph_candidates - 3.0).abs() < 1e-9);
}
