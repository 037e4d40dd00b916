#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use recallgate::config::RecallgateConfig;
use recallgate::memory::store::NewMemory;
use recallgate::memory::types::{MemoryType, Scope};
use recallgate::rollout::strategy::Strategy;
use recallgate::rollout::types::{RolloutActor, RolloutEvent, RolloutMode, GRAPH_ERROR_REASON};
use recallgate::storage::{SqliteStorage, Storage, TelemetrySink};

/// Fresh in-memory storage with schema and migrations applied.
pub fn test_storage() -> SqliteStorage {
    SqliteStorage::open_in_memory().unwrap()
}

pub fn tenant(id: &str) -> Scope {
    Scope::new(Some(id.into()), None, None)
}

/// Fixed clock so window boundaries are exact.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Config with the autopilot switched on.
pub fn autopilot_config(manage_mode: bool) -> RecallgateConfig {
    let mut config = RecallgateConfig::default();
    config.rollout.autopilot.enabled = true;
    config.rollout.autopilot.manage_mode = manage_mode;
    config
}

pub fn add_memory(
    storage: &SqliteStorage,
    scope: &Scope,
    content: &str,
    memory_type: MemoryType,
    tags: &[&str],
) -> String {
    storage
        .add_memory(
            scope,
            &NewMemory {
                content: content.into(),
                memory_type,
                layer: None,
                tags: tags.iter().map(|t| t.to_string()).collect(),
                path: None,
            },
        )
        .unwrap()
        .id
}

/// Force a mode without going through the gate.
pub fn force_mode(storage: &SqliteStorage, scope: &Scope, mode: RolloutMode) {
    storage
        .set_rollout_config(scope, mode, &RolloutActor::Autopilot)
        .unwrap();
}

/// What happened to the graph path of a synthetic hybrid request.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Expansion returned this many graph candidates.
    Expanded(u32),
    GraphError,
    Timeout,
}

/// A hybrid request in `mode` with a baseline of three candidates.
pub fn hybrid_event(mode: RolloutMode, at: DateTime<Utc>, outcome: Outcome) -> RolloutEvent {
    let attempted = mode != RolloutMode::Off;
    let canary = mode == RolloutMode::Canary;
    let (graph_candidates, fallback_reason) = match outcome {
        Outcome::Expanded(n) if attempted => (n, None),
        Outcome::Expanded(_) => (0, None),
        Outcome::GraphError => (0, Some(GRAPH_ERROR_REASON.to_string())),
        Outcome::Timeout => (0, Some("graph_expansion_timeout".to_string())),
    };
    let expanded = if canary { graph_candidates } else { 0 };
    RolloutEvent {
        created_at_ms: at.timestamp_millis(),
        requested_strategy: Some(Strategy::Hybrid),
        applied_strategy: Strategy::Hybrid,
        rollout_mode: mode,
        shadow_executed: mode == RolloutMode::Shadow,
        canary_applied: canary,
        fallback_triggered: fallback_reason.is_some(),
        fallback_reason,
        baseline_candidates: 3,
        graph_candidates,
        graph_expanded_count: expanded,
        total_candidates: 3 + expanded,
    }
}

/// Record `count` identical hybrid events one second apart, ending at `at`.
pub fn seed_events(
    storage: &SqliteStorage,
    scope: &Scope,
    mode: RolloutMode,
    at: DateTime<Utc>,
    outcome: Outcome,
    count: u32,
) {
    for i in 0..count {
        let event = hybrid_event(mode, at - Duration::seconds(i64::from(i)), outcome);
        storage.record_event(scope, &event).unwrap();
    }
}
