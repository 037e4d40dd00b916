//! Persisted rollout state and the raw per-request event.

use serde::{Deserialize, Serialize};

use crate::rollout::quality_gate::GateStatus;
use crate::rollout::strategy::Strategy;

/// How far graph expansion has been rolled out for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RolloutMode {
    /// Never run graph expansion.
    #[default]
    Off,
    /// Run graph expansion for measurement only; results are discarded.
    Shadow,
    /// Apply graph expansion to hybrid-requested traffic.
    Canary,
}

impl RolloutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Shadow => "shadow",
            Self::Canary => "canary",
        }
    }

    /// Position along off → shadow → canary.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Shadow => 1,
            Self::Canary => 2,
        }
    }
}

impl std::fmt::Display for RolloutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RolloutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "shadow" => Ok(Self::Shadow),
            "canary" => Ok(Self::Canary),
            other => Err(format!("unknown rollout mode: {other}. Expected off, shadow or canary")),
        }
    }
}

/// Who is changing rollout state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutActor {
    Operator(String),
    /// The autopilot engine acting on a plan whose gate has already run.
    Autopilot,
}

pub const AUTOPILOT_ACTOR: &str = "autopilot";

impl RolloutActor {
    /// Value stored in `updated_by`.
    pub fn id(&self) -> &str {
        match self {
            Self::Operator(id) => id,
            Self::Autopilot => AUTOPILOT_ACTOR,
        }
    }

    pub fn is_autopilot(&self) -> bool {
        matches!(self, Self::Autopilot)
    }
}

/// Per-tenant rollout mode plus audit metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutConfig {
    pub mode: RolloutMode,
    pub updated_at: String,
    pub updated_by: Option<String>,
}

impl RolloutConfig {
    /// What a tenant that never configured rollout gets.
    pub fn synthesized(now: &str) -> Self {
        Self {
            mode: RolloutMode::Off,
            updated_at: now.to_string(),
            updated_by: None,
        }
    }
}

/// What the autopilot decided about the default strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultDecision {
    HoldLexicalDefault,
    PromoteHybridDefault,
}

impl DefaultDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HoldLexicalDefault => "hold_lexical_default",
            Self::PromoteHybridDefault => "promote_hybrid_default",
        }
    }
}

impl std::fmt::Display for DefaultDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DefaultDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hold_lexical_default" => Ok(Self::HoldLexicalDefault),
            "promote_hybrid_default" => Ok(Self::PromoteHybridDefault),
            _ => Err(format!("unknown default decision: {s}")),
        }
    }
}

/// Per-tenant default strategy and autopilot streak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalPolicy {
    /// Strategy used when a caller does not name one. Only lexical or hybrid.
    pub default_strategy: Strategy,
    pub ready_window_streak: u32,
    pub last_decision: Option<DefaultDecision>,
    pub last_evaluated_at: Option<String>,
    /// Gate status from the most recent autopilot run.
    pub last_gate_status: Option<GateStatus>,
    pub updated_at: String,
    pub updated_by: Option<String>,
}

impl RetrievalPolicy {
    pub fn synthesized(now: &str) -> Self {
        Self {
            default_strategy: Strategy::Lexical,
            ready_window_streak: 0,
            last_decision: None,
            last_evaluated_at: None,
            last_gate_status: None,
            updated_at: now.to_string(),
            updated_by: None,
        }
    }
}

/// Full replacement written by one policy upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyUpdate {
    pub default_strategy: Strategy,
    pub ready_window_streak: u32,
    pub last_decision: DefaultDecision,
    pub gate_status: GateStatus,
    pub evaluated_at: String,
    pub updated_by: String,
}

/// One retrieval call, as recorded for later aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutEvent {
    pub created_at_ms: i64,
    /// Explicitly requested strategy after normalization; `None` when the
    /// policy default was used.
    pub requested_strategy: Option<Strategy>,
    /// Effective strategy the request ran with.
    pub applied_strategy: Strategy,
    pub rollout_mode: RolloutMode,
    pub shadow_executed: bool,
    pub canary_applied: bool,
    pub fallback_triggered: bool,
    pub fallback_reason: Option<String>,
    pub baseline_candidates: u32,
    pub graph_candidates: u32,
    pub graph_expanded_count: u32,
    pub total_candidates: u32,
}

/// `fallback_reason` of a fallback caused by a graph storage failure.
pub const GRAPH_ERROR_REASON: &str = "graph_expansion_error";

impl RolloutEvent {
    pub fn hybrid_requested(&self) -> bool {
        self.applied_strategy == Strategy::Hybrid
    }

    pub fn graph_error(&self) -> bool {
        self.fallback_triggered && self.fallback_reason.as_deref() == Some(GRAPH_ERROR_REASON)
    }
}
