//! Rollout mode changes.
//!
//! Any mode may be set directly, except that moving into `canary` requires the
//! quality gate to be neither failing nor short of data. The autopilot skips the
//! check: it only applies modes from a plan whose gate already ran.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RolloutSettings;
use crate::error::Result;
use crate::memory::types::Scope;
use crate::rollout::policy::evaluate_gate;
use crate::rollout::quality_gate::{GateStatus, QualityGateResult};
use crate::rollout::types::{RolloutActor, RolloutConfig, RolloutMode};
use crate::storage::Storage;

/// Blocker code when the gate has too little traffic to judge.
pub const INSUFFICIENT_DATA: &str = "INSUFFICIENT_DATA";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ModeChange {
    Applied(RolloutConfig),
    /// Structured refusal so operator tooling can show the unmet SLOs.
    Rejected {
        #[serde(rename = "blockerCodes")]
        blocker_codes: Vec<String>,
        gate: Box<QualityGateResult>,
    },
}

pub fn set_rollout_mode(
    storage: &dyn Storage,
    scope: &Scope,
    settings: &RolloutSettings,
    mode: RolloutMode,
    actor: &RolloutActor,
    now: DateTime<Utc>,
) -> Result<ModeChange> {
    let current = storage.get_rollout_config(scope)?;

    if mode == RolloutMode::Canary && current.mode != RolloutMode::Canary && !actor.is_autopilot() {
        let gate =
            evaluate_gate(storage, scope, settings, current.mode, settings.window_hours, now)?;
        let blocker_codes = match gate.status {
            GateStatus::Fail => gate.blocking_codes(),
            GateStatus::InsufficientData => vec![INSUFFICIENT_DATA.to_string()],
            GateStatus::Pass | GateStatus::Warn => Vec::new(),
        };
        if !blocker_codes.is_empty() {
            warn!(
                tenant = %scope.tenant_key(),
                from = %current.mode,
                actor = actor.id(),
                blockers = %blocker_codes.join(","),
                "canary transition rejected by quality gate"
            );
            return Ok(ModeChange::Rejected {
                blocker_codes,
                gate: Box::new(gate),
            });
        }
    }

    let config = storage.set_rollout_config(scope, mode, actor)?;
    info!(
        tenant = %scope.tenant_key(),
        from = %current.mode,
        to = %mode,
        actor = actor.id(),
        "rollout mode set"
    );
    Ok(ModeChange::Applied(config))
}
