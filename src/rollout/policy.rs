//! Rollout policy engine.
//!
//! Turns the current mode, a fresh quality gate verdict and the stored ready
//! streak into a [`RolloutPlan`]: which mode to recommend, whether graph
//! retrieval is ready to be the default, and whether autopilot should promote
//! the default strategy now.
//!
//! [`evaluate_rollout`] is read-only. [`run_autopilot`] evaluates and then
//! persists the streak, decision and (on promotion) the new default strategy
//! in a single policy upsert.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{RolloutSettings, SloThresholds};
use crate::error::Result;
use crate::memory::types::Scope;
use crate::rollout::metrics::{compute_windows, validate_window_hours};
use crate::rollout::quality_gate::{evaluate_quality_gate, GateInput, GateStatus, QualityGateResult};
use crate::rollout::strategy::Strategy;
use crate::rollout::transition::{set_rollout_mode, ModeChange};
use crate::rollout::types::{
    DefaultDecision, PolicyUpdate, RetrievalPolicy, RolloutActor, RolloutConfig, RolloutMode,
    AUTOPILOT_ACTOR,
};
use crate::storage::Storage;

pub mod blocker_codes {
    pub const ROLLOUT_MODE_NOT_CANARY: &str = "ROLLOUT_MODE_NOT_CANARY";
    pub const QUALITY_GATE_NOT_PASSING: &str = "QUALITY_GATE_NOT_PASSING";
    pub const INSUFFICIENT_HYBRID_SAMPLES: &str = "INSUFFICIENT_HYBRID_SAMPLES";
    pub const INSUFFICIENT_CANARY_SAMPLES: &str = "INSUFFICIENT_CANARY_SAMPLES";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotStatus {
    pub enabled: bool,
    /// This evaluation wrote `defaultStrategy = hybrid`.
    pub applied: bool,
    pub promote_after_ready_windows: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutPlan {
    pub evaluated_at: String,
    pub current_mode: RolloutMode,
    pub recommended_mode: RolloutMode,
    pub default_behavior_decision: DefaultDecision,
    pub rationale: String,
    pub ready_for_default_on: bool,
    pub blocker_codes: Vec<String>,
    pub slo: SloThresholds,
    pub autopilot: AutopilotStatus,
    pub default_strategy: Strategy,
    /// Streak this evaluation would leave behind.
    pub ready_window_streak: u32,
    pub quality_gate: QualityGateResult,
}

/// Pure inputs to [`build_plan`].
#[derive(Debug, Clone)]
pub struct PlanInputs<'a> {
    pub current_mode: RolloutMode,
    pub gate: QualityGateResult,
    pub policy: &'a RetrievalPolicy,
    pub settings: &'a RolloutSettings,
    pub evaluated_at: DateTime<Utc>,
}

/// Compute a plan without touching storage. `autopilot.applied` is always false
/// here; only [`run_autopilot`] applies anything.
pub fn build_plan(inputs: PlanInputs<'_>) -> RolloutPlan {
    let PlanInputs {
        current_mode,
        gate,
        policy,
        settings,
        evaluated_at,
    } = inputs;
    let slo = &settings.slo;
    let autopilot = &settings.autopilot;

    let recommended_mode = recommend_mode(current_mode, &gate, slo);
    let blockers = default_on_blockers(current_mode, &gate, slo);
    let ready_for_default_on = blockers.is_empty();

    let ready_window_streak = if ready_for_default_on {
        policy.ready_window_streak.saturating_add(1)
    } else {
        0
    };
    let promote = ready_for_default_on
        && autopilot.enabled
        && ready_window_streak >= autopilot.promote_after_ready_windows;
    let default_behavior_decision = if promote {
        DefaultDecision::PromoteHybridDefault
    } else {
        DefaultDecision::HoldLexicalDefault
    };

    let rationale = rationale(
        current_mode,
        recommended_mode,
        &gate,
        &blockers,
        ready_window_streak,
        settings,
        promote,
    );

    RolloutPlan {
        evaluated_at: evaluated_at.to_rfc3339(),
        current_mode,
        recommended_mode,
        default_behavior_decision,
        rationale,
        ready_for_default_on,
        blocker_codes: blockers,
        slo: slo.clone(),
        autopilot: AutopilotStatus {
            enabled: autopilot.enabled,
            applied: false,
            promote_after_ready_windows: autopilot.promote_after_ready_windows,
        },
        default_strategy: policy.default_strategy,
        ready_window_streak,
        quality_gate: gate,
    }
}

/// Whether the shadow run has produced enough healthy signal to try canary.
pub fn shadow_slos_met(gate: &QualityGateResult, slo: &SloThresholds) -> bool {
    let current = &gate.current;
    current.shadow_executions >= slo.min_shadow_executions_for_canary
        && current.shadow_avg_graph_candidates >= slo.min_shadow_average_graph_candidates
        && current.shadow_graph_error_rate <= slo.max_shadow_graph_error_rate_for_canary
}

/// Never escalates past the current mode on a failing gate.
fn recommend_mode(
    current: RolloutMode,
    gate: &QualityGateResult,
    slo: &SloThresholds,
) -> RolloutMode {
    match (current, gate.status) {
        (RolloutMode::Canary, GateStatus::Fail) => RolloutMode::Shadow,
        (mode, GateStatus::Fail) => mode,
        (RolloutMode::Shadow, GateStatus::Pass | GateStatus::Warn)
            if shadow_slos_met(gate, slo) =>
        {
            RolloutMode::Canary
        }
        (mode, _) => mode,
    }
}

/// Codes that keep graph retrieval from becoming the default. Empty means ready.
fn default_on_blockers(
    mode: RolloutMode,
    gate: &QualityGateResult,
    slo: &SloThresholds,
) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    let mut push = |code: &str| {
        if !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    };

    if mode != RolloutMode::Canary {
        push(blocker_codes::ROLLOUT_MODE_NOT_CANARY);
    }
    if gate.status != GateStatus::Pass {
        push(blocker_codes::QUALITY_GATE_NOT_PASSING);
        for reason in &gate.reasons {
            push(reason.code);
        }
    }
    if gate.current.hybrid_requested < slo.min_hybrid_samples_for_default_on {
        push(blocker_codes::INSUFFICIENT_HYBRID_SAMPLES);
    }
    if gate.current.canary_applied < slo.min_canary_samples_for_default_on {
        push(blocker_codes::INSUFFICIENT_CANARY_SAMPLES);
    }
    codes
}

fn rationale(
    current: RolloutMode,
    recommended: RolloutMode,
    gate: &QualityGateResult,
    blockers: &[String],
    streak: u32,
    settings: &RolloutSettings,
    promote: bool,
) -> String {
    let mode_part = if recommended == current {
        format!("hold {current} (quality gate {})", gate.status)
    } else {
        format!("move {current} -> {recommended} (quality gate {})", gate.status)
    };

    let default_part = if promote {
        format!(
            "promote hybrid default after {streak} consecutive ready window(s)"
        )
    } else if blockers.is_empty() && !settings.autopilot.enabled {
        format!("ready for default-on ({streak} ready window(s)); autopilot disabled")
    } else if blockers.is_empty() {
        format!(
            "ready for default-on, {streak}/{} ready windows",
            settings.autopilot.promote_after_ready_windows
        )
    } else {
        format!("hold lexical default: {}", blockers.join(", "))
    };

    format!("{mode_part}; {default_part}")
}

/// Read config, policy and event windows and build a plan. Writes nothing.
pub fn evaluate_rollout(
    storage: &dyn Storage,
    scope: &Scope,
    settings: &RolloutSettings,
    window_hours: Option<u32>,
    now: DateTime<Utc>,
) -> Result<RolloutPlan> {
    let window_hours = match window_hours {
        Some(hours) => validate_window_hours(hours)?,
        None => settings.window_hours,
    };
    let config = storage.get_rollout_config(scope)?;
    let policy = storage.get_retrieval_policy(scope)?;
    let gate = evaluate_gate(storage, scope, settings, config.mode, window_hours, now)?;

    let plan = build_plan(PlanInputs {
        current_mode: config.mode,
        gate,
        policy: &policy,
        settings,
        evaluated_at: now,
    });
    debug!(
        tenant = %scope.tenant_key(),
        mode = %plan.current_mode,
        recommended = %plan.recommended_mode,
        gate = %plan.quality_gate.status,
        ready = plan.ready_for_default_on,
        "rollout evaluated"
    );
    Ok(plan)
}

/// Aggregate windows and run the gate for `mode`.
pub fn evaluate_gate(
    storage: &dyn Storage,
    scope: &Scope,
    settings: &RolloutSettings,
    mode: RolloutMode,
    window_hours: u32,
    now: DateTime<Utc>,
) -> Result<QualityGateResult> {
    let windows = compute_windows(storage, scope, now, window_hours)?;
    Ok(evaluate_quality_gate(GateInput {
        windows,
        window_hours,
        mode,
        settings,
        evaluated_at: now,
    }))
}

/// Outcome of one autopilot pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotRun {
    pub plan: RolloutPlan,
    pub policy: RetrievalPolicy,
    /// Set when `manage_mode` applied the recommended mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_change: Option<RolloutConfig>,
}

/// Evaluate, then persist the streak and decision. On promotion the default
/// strategy flips to hybrid in the same upsert.
pub fn run_autopilot(
    storage: &dyn Storage,
    scope: &Scope,
    settings: &RolloutSettings,
    now: DateTime<Utc>,
) -> Result<AutopilotRun> {
    let mut plan = evaluate_rollout(storage, scope, settings, None, now)?;
    let promote = plan.default_behavior_decision == DefaultDecision::PromoteHybridDefault;
    let applied = promote && plan.default_strategy != Strategy::Hybrid;
    let default_strategy = if promote {
        Strategy::Hybrid
    } else {
        plan.default_strategy
    };

    let policy = storage.set_retrieval_policy(
        scope,
        &PolicyUpdate {
            default_strategy,
            ready_window_streak: plan.ready_window_streak,
            last_decision: plan.default_behavior_decision,
            gate_status: plan.quality_gate.status,
            evaluated_at: plan.evaluated_at.clone(),
            updated_by: AUTOPILOT_ACTOR.to_string(),
        },
    )?;
    plan.autopilot.applied = applied;
    plan.default_strategy = policy.default_strategy;

    if applied {
        info!(
            tenant = %scope.tenant_key(),
            streak = policy.ready_window_streak,
            "autopilot promoted hybrid to default strategy"
        );
    }

    let mut mode_change = None;
    if settings.autopilot.manage_mode && plan.recommended_mode != plan.current_mode {
        let change = set_rollout_mode(
            storage,
            scope,
            settings,
            plan.recommended_mode,
            &RolloutActor::Autopilot,
            now,
        )?;
        if let ModeChange::Applied(config) = change {
            mode_change = Some(config);
        }
    }

    Ok(AutopilotRun {
        plan,
        policy,
        mode_change,
    })
}
