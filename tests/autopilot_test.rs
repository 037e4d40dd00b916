mod helpers;

use chrono::Duration;
use helpers::{autopilot_config, fixed_now, force_mode, seed_events, tenant, test_storage, Outcome};
use recallgate::config::RecallgateConfig;
use recallgate::rollout::policy::{blocker_codes, evaluate_rollout, run_autopilot};
use recallgate::rollout::strategy::Strategy;
use recallgate::rollout::types::{DefaultDecision, RolloutMode};
use recallgate::storage::Storage;

#[test]
fn promotes_after_consecutive_ready_windows() {
    let storage = test_storage();
    let scope = tenant("acme");
    let config = autopilot_config(false);
    let now = fixed_now();
    force_mode(&storage, &scope, RolloutMode::Canary);
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::Expanded(2), 20);

    let first = run_autopilot(&storage, &scope, &config.rollout, now).unwrap();
    assert!(first.plan.ready_for_default_on);
    assert_eq!(first.policy.ready_window_streak, 1);
    assert_eq!(first.plan.default_behavior_decision, DefaultDecision::HoldLexicalDefault);
    assert_eq!(first.policy.default_strategy, Strategy::Lexical);
    assert!(!first.plan.autopilot.applied);

    let later = now + Duration::minutes(1);
    let second = run_autopilot(&storage, &scope, &config.rollout, later).unwrap();
    assert_eq!(second.policy.ready_window_streak, 2);
    assert_eq!(second.plan.default_behavior_decision, DefaultDecision::PromoteHybridDefault);
    assert!(second.plan.autopilot.applied);
    assert_eq!(second.policy.default_strategy, Strategy::Hybrid);
    assert_eq!(second.policy.last_decision, Some(DefaultDecision::PromoteHybridDefault));
    assert_eq!(second.policy.updated_by.as_deref(), Some("autopilot"));
    assert_eq!(second.policy.last_gate_status, Some(second.plan.quality_gate.status));
    let stored = storage.get_retrieval_policy(&scope).unwrap();
    assert_eq!(stored.last_gate_status, Some(second.plan.quality_gate.status));

    // Already hybrid: still a promote decision but nothing new applied
    let later = now + Duration::minutes(2);
    let third = run_autopilot(&storage, &scope, &config.rollout, later).unwrap();
    assert_eq!(third.plan.default_behavior_decision, DefaultDecision::PromoteHybridDefault);
    assert!(!third.plan.autopilot.applied);
    assert_eq!(third.policy.ready_window_streak, 3);
}

#[test]
fn streak_resets_when_not_ready_without_demoting() {
    let storage = test_storage();
    let scope = tenant("acme");
    let config = autopilot_config(false);
    let now = fixed_now();
    force_mode(&storage, &scope, RolloutMode::Canary);
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::Expanded(2), 20);

    run_autopilot(&storage, &scope, &config.rollout, now).unwrap();
    let promoted = run_autopilot(&storage, &scope, &config.rollout, now).unwrap();
    assert_eq!(promoted.policy.default_strategy, Strategy::Hybrid);

    // Two days later the traffic has aged out of both windows
    let later = now + Duration::hours(49);
    let run = run_autopilot(&storage, &scope, &config.rollout, later).unwrap();
    assert!(!run.plan.ready_for_default_on);
    assert_eq!(run.policy.ready_window_streak, 0);
    assert_eq!(run.plan.default_behavior_decision, DefaultDecision::HoldLexicalDefault);
    assert_eq!(run.policy.default_strategy, Strategy::Hybrid);
    assert!(run
        .plan
        .blocker_codes
        .contains(&blocker_codes::INSUFFICIENT_HYBRID_SAMPLES.to_string()));
}

#[test]
fn disabled_autopilot_counts_but_never_promotes() {
    let storage = test_storage();
    let scope = tenant("acme");
    let config = RecallgateConfig::default();
    let now = fixed_now();
    force_mode(&storage, &scope, RolloutMode::Canary);
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::Expanded(2), 20);

    for expected in 1..=3 {
        let run = run_autopilot(&storage, &scope, &config.rollout, now).unwrap();
        assert_eq!(run.policy.ready_window_streak, expected);
        assert_eq!(run.plan.default_behavior_decision, DefaultDecision::HoldLexicalDefault);
        assert!(!run.plan.autopilot.enabled);
    }
    assert_eq!(
        storage.get_retrieval_policy(&scope).unwrap().default_strategy,
        Strategy::Lexical
    );
}

#[test]
fn evaluate_rollout_is_read_only() {
    let storage = test_storage();
    let scope = tenant("acme");
    let config = autopilot_config(false);
    let now = fixed_now();
    force_mode(&storage, &scope, RolloutMode::Canary);
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::Expanded(2), 20);

    for _ in 0..3 {
        let plan = evaluate_rollout(&storage, &scope, &config.rollout, None, now).unwrap();
        assert_eq!(plan.ready_window_streak, 1);
    }
    let policy = storage.get_retrieval_policy(&scope).unwrap();
    assert_eq!(policy.ready_window_streak, 0);
    assert!(policy.last_decision.is_none());
}

#[test]
fn shadow_mode_is_never_ready_for_default_on() {
    let storage = test_storage();
    let scope = tenant("acme");
    let config = autopilot_config(false);
    let now = fixed_now();
    force_mode(&storage, &scope, RolloutMode::Shadow);
    seed_events(&storage, &scope, RolloutMode::Shadow, now, Outcome::Expanded(2), 40);

    let plan = evaluate_rollout(&storage, &scope, &config.rollout, None, now).unwrap();
    assert!(!plan.ready_for_default_on);
    assert_eq!(plan.blocker_codes[0], blocker_codes::ROLLOUT_MODE_NOT_CANARY);
    assert_eq!(plan.recommended_mode, RolloutMode::Canary);
}

#[test]
fn managed_mode_applies_recommendation() {
    let storage = test_storage();
    let scope = tenant("acme");
    let config = autopilot_config(true);
    let now = fixed_now();
    force_mode(&storage, &scope, RolloutMode::Shadow);
    seed_events(&storage, &scope, RolloutMode::Shadow, now, Outcome::Expanded(2), 40);

    let run = run_autopilot(&storage, &scope, &config.rollout, now).unwrap();
    let changed = run.mode_change.expect("autopilot should move shadow to canary");
    assert_eq!(changed.mode, RolloutMode::Canary);
    assert_eq!(changed.updated_by.as_deref(), Some("autopilot"));
    assert_eq!(storage.get_rollout_config(&scope).unwrap().mode, RolloutMode::Canary);
}

#[test]
fn managed_mode_steps_back_from_failing_canary() {
    let storage = test_storage();
    let scope = tenant("acme");
    let config = autopilot_config(true);
    let now = fixed_now();
    force_mode(&storage, &scope, RolloutMode::Canary);
    seed_events(&storage, &scope, RolloutMode::Canary, now, Outcome::GraphError, 20);

    let run = run_autopilot(&storage, &scope, &config.rollout, now).unwrap();
    assert_eq!(run.plan.recommended_mode, RolloutMode::Shadow);
    assert_eq!(run.mode_change.map(|c| c.mode), Some(RolloutMode::Shadow));
}
