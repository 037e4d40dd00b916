//! Windowed rollout metrics.
//!
//! Windows are derived on demand from raw [`RolloutEvent`]s; nothing here is
//! persisted. Every rate returns `0.0` when its denominator is zero.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{RecallError, Result};
use crate::memory::types::Scope;
use crate::rollout::types::RolloutEvent;
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsWindow {
    pub start_at: String,
    pub end_at: String,
    pub total_requests: u64,
    pub hybrid_requested: u64,
    pub canary_applied: u64,
    pub hybrid_fallbacks: u64,
    pub graph_error_fallbacks: u64,
    pub fallback_rate: f64,
    pub graph_error_fallback_rate: f64,
    pub canary_with_expansion: u64,
    pub expansion_coverage_rate: f64,
    pub avg_expanded_count: f64,
    pub avg_candidate_lift: f64,
    pub shadow_executions: u64,
    pub shadow_avg_graph_candidates: f64,
    pub shadow_graph_error_fallbacks: u64,
    pub shadow_graph_error_rate: f64,
    pub graph_candidate_total: u64,
}

/// Longest accepted comparison window: one year.
pub const MAX_WINDOW_HOURS: u32 = 8760;

/// Reject window lengths outside `1..=MAX_WINDOW_HOURS`.
pub fn validate_window_hours(window_hours: u32) -> Result<u32> {
    if (1..=MAX_WINDOW_HOURS).contains(&window_hours) {
        Ok(window_hours)
    } else {
        Err(RecallError::validation(
            "INVALID_WINDOW",
            format!("window_hours must be between 1 and {MAX_WINDOW_HOURS}, got {window_hours}"),
        ))
    }
}

/// The current window and the equal-length window immediately before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowPair {
    pub current: MetricsWindow,
    pub previous: MetricsWindow,
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

/// Fold events into a window spanning `(start, end]`. Events are assumed to be
/// already filtered to that range.
pub fn aggregate_window(
    events: &[RolloutEvent],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> MetricsWindow {
    let mut hybrid_requested = 0u64;
    let mut hybrid_fallbacks = 0u64;
    let mut graph_error_fallbacks = 0u64;
    let mut canary_applied = 0u64;
    let mut canary_with_expansion = 0u64;
    let mut expanded_total = 0u64;
    let mut lift_total = 0i64;
    let mut shadow_executions = 0u64;
    let mut shadow_graph_candidates = 0u64;
    let mut shadow_graph_error_fallbacks = 0u64;
    let mut graph_candidate_total = 0u64;

    for event in events {
        graph_candidate_total += u64::from(event.graph_candidates);

        if event.hybrid_requested() {
            hybrid_requested += 1;
            if event.fallback_triggered {
                hybrid_fallbacks += 1;
            }
            if event.graph_error() {
                graph_error_fallbacks += 1;
            }
        }

        if event.canary_applied {
            canary_applied += 1;
            expanded_total += u64::from(event.graph_expanded_count);
            if event.graph_expanded_count > 0 {
                canary_with_expansion += 1;
            }
            lift_total += i64::from(event.total_candidates) - i64::from(event.baseline_candidates);
        }

        if event.shadow_executed {
            shadow_executions += 1;
            shadow_graph_candidates += u64::from(event.graph_candidates);
            if event.graph_error() {
                shadow_graph_error_fallbacks += 1;
            }
        }
    }

    MetricsWindow {
        start_at: start.to_rfc3339(),
        end_at: end.to_rfc3339(),
        total_requests: events.len() as u64,
        hybrid_requested,
        canary_applied,
        hybrid_fallbacks,
        graph_error_fallbacks,
        fallback_rate: ratio(hybrid_fallbacks as f64, hybrid_requested),
        graph_error_fallback_rate: ratio(graph_error_fallbacks as f64, hybrid_requested),
        canary_with_expansion,
        expansion_coverage_rate: ratio(canary_with_expansion as f64, canary_applied),
        avg_expanded_count: ratio(expanded_total as f64, canary_applied),
        avg_candidate_lift: ratio(lift_total as f64, canary_applied),
        shadow_executions,
        shadow_avg_graph_candidates: ratio(shadow_graph_candidates as f64, shadow_executions),
        shadow_graph_error_fallbacks,
        shadow_graph_error_rate: ratio(shadow_graph_error_fallbacks as f64, shadow_executions),
        graph_candidate_total,
    }
}

/// Read events for `(now - 2h, now]` and split them into `previous = (now - 2h, now - h]`
/// and `current = (now - h, now]`.
pub fn compute_windows(
    storage: &dyn Storage,
    scope: &Scope,
    now: DateTime<Utc>,
    window_hours: u32,
) -> Result<WindowPair> {
    let span = Duration::hours(i64::from(validate_window_hours(window_hours)?));
    let (current_start, previous_start) = now
        .checked_sub_signed(span)
        .and_then(|current| Some((current, current.checked_sub_signed(span)?)))
        .ok_or_else(|| {
            RecallError::validation(
                "INVALID_WINDOW",
                "window extends before the earliest timestamp",
            )
        })?;
    let boundary_ms = current_start.timestamp_millis();

    let events = storage.query_rollout_events(
        scope,
        previous_start.timestamp_millis(),
        now.timestamp_millis(),
    )?;
    let (previous, current): (Vec<RolloutEvent>, Vec<RolloutEvent>) = events
        .into_iter()
        .partition(|e| e.created_at_ms <= boundary_ms);

    tracing::debug!(
        tenant = %scope.tenant_key(),
        window_hours,
        current = current.len(),
        previous = previous.len(),
        "aggregated rollout windows"
    );

    Ok(WindowPair {
        current: aggregate_window(&current, current_start, now),
        previous: aggregate_window(&previous, previous_start, current_start),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollout::strategy::Strategy;
    use crate::rollout::types::{RolloutMode, GRAPH_ERROR_REASON};

    fn base(strategy: Strategy) -> RolloutEvent {
        RolloutEvent {
            created_at_ms: 0,
            requested_strategy: Some(strategy),
            applied_strategy: strategy,
            rollout_mode: RolloutMode::Canary,
            shadow_executed: false,
            canary_applied: false,
            fallback_triggered: false,
            fallback_reason: None,
            baseline_candidates: 4,
            graph_candidates: 0,
            graph_expanded_count: 0,
            total_candidates: 4,
        }
    }

    #[test]
    fn window_hours_bounds() {
        assert_eq!(validate_window_hours(1).unwrap(), 1);
        assert_eq!(validate_window_hours(MAX_WINDOW_HOURS).unwrap(), MAX_WINDOW_HOURS);
        for bad in [0, MAX_WINDOW_HOURS + 1, u32::MAX] {
            let err = validate_window_hours(bad).unwrap_err();
            assert_eq!(err.code(), "INVALID_WINDOW");
        }
    }

    #[test]
    fn oversized_window_is_rejected_before_reading_events() {
        let storage = crate::storage::SqliteStorage::open_in_memory().unwrap();
        let scope = Scope::new(Some("acme".into()), None, None);
        let err = compute_windows(&storage, &scope, Utc::now(), u32::MAX).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.code(), "INVALID_WINDOW");
    }

    fn window(events: &[RolloutEvent]) -> MetricsWindow {
        let end = Utc::now();
        aggregate_window(events, end - Duration::hours(24), end)
    }

    #[test]
    fn empty_window_rates_are_zero() {
        let w = window(&[]);
        assert_eq!(w.hybrid_requested, 0);
        assert_eq!(w.fallback_rate, 0.0);
        assert_eq!(w.graph_error_fallback_rate, 0.0);
        assert_eq!(w.expansion_coverage_rate, 0.0);
        assert_eq!(w.avg_expanded_count, 0.0);
        assert_eq!(w.avg_candidate_lift, 0.0);
        assert_eq!(w.shadow_avg_graph_candidates, 0.0);
        assert!(!w.fallback_rate.is_nan());
    }

    #[test]
    fn lexical_only_traffic_has_zero_fallback_rate() {
        let w = window(&[base(Strategy::Lexical), base(Strategy::Lexical)]);
        assert_eq!(w.total_requests, 2);
        assert_eq!(w.hybrid_requested, 0);
        assert_eq!(w.fallback_rate, 0.0);
    }

    #[test]
    fn fallbacks_split_by_reason() {
        let mut timeout = base(Strategy::Hybrid);
        timeout.fallback_triggered = true;
        timeout.fallback_reason = Some("graph_expansion_timeout".into());
        let mut error = base(Strategy::Hybrid);
        error.fallback_triggered = true;
        error.fallback_reason = Some(GRAPH_ERROR_REASON.into());

        let w = window(&[timeout, error, base(Strategy::Hybrid), base(Strategy::Hybrid)]);
        assert_eq!(w.hybrid_requested, 4);
        assert_eq!(w.hybrid_fallbacks, 2);
        assert_eq!(w.graph_error_fallbacks, 1);
        assert!((w.fallback_rate - 0.5).abs() < 1e-9);
        assert!((w.graph_error_fallback_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn canary_coverage_and_lift() {
        let mut expanded = base(Strategy::Hybrid);
        expanded.canary_applied = true;
        expanded.graph_candidates = 3;
        expanded.graph_expanded_count = 3;
        expanded.total_candidates = 7;
        let mut empty = base(Strategy::Hybrid);
        empty.canary_applied = true;

        let w = window(&[expanded, empty]);
        assert_eq!(w.canary_applied, 2);
        assert_eq!(w.canary_with_expansion, 1);
        assert!((w.expansion_coverage_rate - 0.5).abs() < 1e-9);
        assert!((w.avg_expanded_count - 1.5).abs() < 1e-9);
        assert!((w.avg_candidate_lift - 1.5).abs() < 1e-9);
        assert_eq!(w.graph_candidate_total, 3);
    }

    #[test]
    fn shadow_metrics() {
        let mut ok = base(Strategy::Hybrid);
        ok.rollout_mode = RolloutMode::Shadow;
        ok.shadow_executed = true;
        ok.graph_candidates = 4;
        let mut failed = ok.clone();
        failed.graph_candidates = 0;
        failed.fallback_triggered = true;
        failed.fallback_reason = Some(GRAPH_ERROR_REASON.into());

        let w = window(&[ok, failed]);
        assert_eq!(w.shadow_executions, 2);
        assert!((w.shadow_avg_graph_candidates - 2.0).abs() < 1e-9);
        assert_eq!(w.shadow_graph_error_fallbacks, 1);
        assert!((w.shadow_graph_error_rate - 0.5).abs() < 1e-9);
        assert_eq!(w.canary_applied, 0);
    }
}
