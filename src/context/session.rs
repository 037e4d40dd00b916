//! Session compaction guidance.
//!
//! Clients hold their own conversation history and report a few counters with
//! each context request. From those counters and the assembled bundle this
//! module decides whether the client should compact its history now.
//! Malformed counters are treated as absent, never as errors.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::CompactionConfig;
use crate::memory::types::{Memory, SkillFile};

/// Counters declared by the client. Numeric fields are taken as raw JSON
/// numbers and validated here.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSignals {
    pub session_id: Option<String>,
    /// Token budget for the client's context window.
    pub budget_tokens: Option<f64>,
    pub turn_count: Option<f64>,
    pub turn_budget: Option<f64>,
    /// RFC 3339 timestamp of the last user activity.
    pub last_activity_at: Option<String>,
    pub inactivity_threshold_minutes: Option<f64>,
    pub task_completed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerHint {
    Count,
    Time,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSessionState {
    pub session_id: Option<String>,
    pub estimated_tokens: u64,
    pub budget_tokens: Option<u64>,
    pub turn_count: Option<u64>,
    pub turn_budget: Option<u64>,
    pub compaction_required: bool,
    pub trigger_hint: Option<TriggerHint>,
    pub reason: String,
}

pub const NO_TRIGGER_REASON: &str = "No compaction trigger.";

/// Finite and strictly positive, else absent.
fn positive(value: Option<f64>) -> Option<u64> {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.floor() as u64)
        .filter(|v| *v > 0)
}

/// Finite and not negative, else absent.
fn non_negative(value: Option<f64>) -> Option<u64> {
    value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.floor() as u64)
}

fn positive_minutes(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// `ceil(chars / 4)` for non-empty text, at least 1; 0 for empty text.
fn text_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    if chars == 0 {
        0
    } else {
        chars.div_ceil(4).max(1)
    }
}

fn memory_tokens(memory: &Memory, config: &CompactionConfig) -> u64 {
    config.item_overhead_tokens
        + text_tokens(&memory.content)
        + memory.tags.iter().map(|t| text_tokens(t)).sum::<u64>()
        + memory.path.as_deref().map_or(0, text_tokens)
}

/// Deterministic estimate of what a bundle costs in the client's context.
pub fn estimate_tokens<'a>(
    memories: impl IntoIterator<Item = &'a Memory>,
    skill_files: &[SkillFile],
    config: &CompactionConfig,
) -> u64 {
    let memory_total: u64 = memories.into_iter().map(|m| memory_tokens(m, config)).sum();
    let skill_total: u64 = skill_files
        .iter()
        .map(|s| config.item_overhead_tokens + text_tokens(&s.path) + text_tokens(&s.content))
        .sum();
    config.base_tokens + memory_total + skill_total
}

/// Decide whether the client should compact. The first trigger in
/// count, time, semantic order wins.
pub fn evaluate_compaction(
    estimated_tokens: u64,
    signals: Option<&SessionSignals>,
    now: DateTime<Utc>,
) -> ContextSessionState {
    let default_signals = SessionSignals::default();
    let signals = signals.unwrap_or(&default_signals);

    let budget_tokens = positive(signals.budget_tokens);
    let turn_count = non_negative(signals.turn_count);
    let turn_budget = positive(signals.turn_budget);
    let threshold_minutes = positive_minutes(signals.inactivity_threshold_minutes);
    let last_activity = signals
        .last_activity_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let mut state = ContextSessionState {
        session_id: signals.session_id.clone(),
        estimated_tokens,
        budget_tokens,
        turn_count,
        turn_budget,
        compaction_required: false,
        trigger_hint: None,
        reason: NO_TRIGGER_REASON.to_string(),
    };

    let trigger = count_trigger(estimated_tokens, budget_tokens, turn_count, turn_budget)
        .or_else(|| time_trigger(last_activity, threshold_minutes, now))
        .or_else(|| {
            (signals.task_completed == Some(true)).then(|| {
                (TriggerHint::Semantic, "Client marked the task as completed.".to_string())
            })
        });

    if let Some((hint, reason)) = trigger {
        state.compaction_required = true;
        state.trigger_hint = Some(hint);
        state.reason = reason;
    }
    state
}

fn count_trigger(
    estimated_tokens: u64,
    budget_tokens: Option<u64>,
    turn_count: Option<u64>,
    turn_budget: Option<u64>,
) -> Option<(TriggerHint, String)> {
    if let Some(budget) = budget_tokens {
        if estimated_tokens > budget {
            return Some((
                TriggerHint::Count,
                format!("Estimated tokens {estimated_tokens} exceed budget {budget}."),
            ));
        }
    }
    match (turn_count, turn_budget) {
        (Some(turns), Some(budget)) if turns > budget => Some((
            TriggerHint::Count,
            format!("Turn count {turns} exceeds turn budget {budget}."),
        )),
        _ => None,
    }
}

fn time_trigger(
    last_activity: Option<DateTime<Utc>>,
    threshold_minutes: Option<f64>,
    now: DateTime<Utc>,
) -> Option<(TriggerHint, String)> {
    let (last, threshold) = (last_activity?, threshold_minutes?);
    let idle_minutes = (now - last).num_milliseconds() as f64 / 60_000.0;
    (idle_minutes >= threshold).then(|| {
        (
            TriggerHint::Time,
            format!("Inactive for {idle_minutes:.0} minutes (threshold {threshold} minutes)."),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{MemoryLayer, MemoryType};
    use chrono::Duration;

    fn memory(content: &str, tags: &[&str]) -> Memory {
        Memory {
            id: "m1".into(),
            memory_type: MemoryType::Fact,
            layer: MemoryLayer::LongTerm,
            content: content.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            path: None,
            tenant_id: None,
            user_id: None,
            project_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn token_estimate_is_deterministic() {
        let config = CompactionConfig::default();
        assert_eq!(estimate_tokens(std::iter::empty::<&Memory>(), &[], &config), 32);

        // 9 chars -> 3, tag "db" -> 1, overhead 6
        let m = memory("abcdefghi", &["db"]);
        assert_eq!(estimate_tokens([&m], &[], &config), 32 + 6 + 3 + 1);

        let skill = SkillFile {
            path: "a/b.md".into(),
            content: "x".into(),
        };
        assert_eq!(estimate_tokens([&m], &[skill], &config), 32 + 10 + 6 + 2 + 1);
    }

    #[test]
    fn count_trigger_on_token_budget() {
        let signals = SessionSignals {
            budget_tokens: Some(10.0),
            ..Default::default()
        };
        let state = evaluate_compaction(40, Some(&signals), Utc::now());
        assert!(state.compaction_required);
        assert_eq!(state.trigger_hint, Some(TriggerHint::Count));
        assert!(state.reason.contains("exceed budget 10"));
    }

    #[test]
    fn count_trigger_on_turns() {
        let signals = SessionSignals {
            turn_count: Some(21.0),
            turn_budget: Some(20.0),
            ..Default::default()
        };
        let state = evaluate_compaction(40, Some(&signals), Utc::now());
        assert_eq!(state.trigger_hint, Some(TriggerHint::Count));
        assert!(state.reason.starts_with("Turn count 21"));

        // Turn budget alone does nothing
        let signals = SessionSignals {
            turn_budget: Some(1.0),
            ..Default::default()
        };
        assert!(!evaluate_compaction(40, Some(&signals), Utc::now()).compaction_required);
    }

    #[test]
    fn time_trigger_after_inactivity() {
        let now = Utc::now();
        let signals = SessionSignals {
            last_activity_at: Some((now - Duration::minutes(60)).to_rfc3339()),
            inactivity_threshold_minutes: Some(30.0),
            ..Default::default()
        };
        let state = evaluate_compaction(40, Some(&signals), now);
        assert_eq!(state.trigger_hint, Some(TriggerHint::Time));
        assert!(state.compaction_required);
    }

    #[test]
    fn count_wins_over_time_and_semantic() {
        let now = Utc::now();
        let signals = SessionSignals {
            budget_tokens: Some(10.0),
            last_activity_at: Some((now - Duration::minutes(60)).to_rfc3339()),
            inactivity_threshold_minutes: Some(30.0),
            task_completed: Some(true),
            ..Default::default()
        };
        assert_eq!(
            evaluate_compaction(40, Some(&signals), now).trigger_hint,
            Some(TriggerHint::Count)
        );
    }

    #[test]
    fn semantic_trigger_on_task_completed() {
        let signals = SessionSignals {
            task_completed: Some(true),
            ..Default::default()
        };
        let state = evaluate_compaction(40, Some(&signals), Utc::now());
        assert_eq!(state.trigger_hint, Some(TriggerHint::Semantic));
    }

    #[test]
    fn no_trigger() {
        let now = Utc::now();
        let signals = SessionSignals {
            session_id: Some("s-1".into()),
            budget_tokens: Some(10_000.0),
            turn_count: Some(2.0),
            turn_budget: Some(50.0),
            last_activity_at: Some((now - Duration::minutes(1)).to_rfc3339()),
            inactivity_threshold_minutes: Some(30.0),
            task_completed: Some(false),
        };
        let state = evaluate_compaction(40, Some(&signals), now);
        assert!(!state.compaction_required);
        assert_eq!(state.trigger_hint, None);
        assert_eq!(state.reason, NO_TRIGGER_REASON);
        assert_eq!(state.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn malformed_inputs_are_ignored() {
        let signals = SessionSignals {
            budget_tokens: Some(f64::NAN),
            turn_count: Some(f64::INFINITY),
            turn_budget: Some(-3.0),
            last_activity_at: Some("yesterday".into()),
            inactivity_threshold_minutes: Some(0.0),
            ..Default::default()
        };
        let state = evaluate_compaction(1_000_000, Some(&signals), Utc::now());
        assert!(!state.compaction_required);
        assert!(state.budget_tokens.is_none());
        assert!(state.turn_count.is_none());
        assert!(state.turn_budget.is_none());
    }

    #[test]
    fn no_signals_means_no_trigger() {
        let state = evaluate_compaction(1_000_000, None, Utc::now());
        assert!(!state.compaction_required);
    }
}
