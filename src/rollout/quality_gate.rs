//! Quality gate: a pass/warn/fail verdict over two adjacent metrics windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RolloutSettings;
use crate::rollout::metrics::{MetricsWindow, WindowPair};
use crate::rollout::types::RolloutMode;

pub mod reason_codes {
    pub const FALLBACK_RATE_ABOVE_LIMIT: &str = "FALLBACK_RATE_ABOVE_LIMIT";
    pub const GRAPH_ERROR_RATE_ABOVE_LIMIT: &str = "GRAPH_ERROR_RATE_ABOVE_LIMIT";
    pub const MIN_CANARY_SAMPLES_NOT_MET: &str = "MIN_CANARY_SAMPLES_NOT_MET";
    pub const EXPANSION_COVERAGE_BELOW_LIMIT: &str = "EXPANSION_COVERAGE_BELOW_LIMIT";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pass,
    Warn,
    Fail,
    InsufficientData,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

impl std::str::FromStr for GateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Self::Pass),
            "warn" => Ok(Self::Warn),
            "fail" => Ok(Self::Fail),
            "insufficient_data" => Ok(Self::InsufficientData),
            _ => Err(format!("unknown gate status: {s}")),
        }
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingReason {
    pub code: &'static str,
    pub severity: Severity,
    pub blocking: bool,
    pub metric: &'static str,
    pub current_value: f64,
    pub previous_value: f64,
    pub threshold: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateResult {
    pub evaluated_at: String,
    pub window_hours: u32,
    pub rollout_mode: RolloutMode,
    pub min_hybrid_samples: u64,
    pub min_canary_samples_for_relevance: u64,
    pub status: GateStatus,
    pub canary_blocked: bool,
    pub reasons: Vec<BlockingReason>,
    pub current: MetricsWindow,
    pub previous: MetricsWindow,
}

impl QualityGateResult {
    /// Codes of reasons that block canary.
    pub fn blocking_codes(&self) -> Vec<String> {
        self.reasons
            .iter()
            .filter(|r| r.blocking)
            .map(|r| r.code.to_string())
            .collect()
    }
}

/// Everything the gate looks at.
#[derive(Debug, Clone)]
pub struct GateInput<'a> {
    pub windows: WindowPair,
    pub window_hours: u32,
    pub mode: RolloutMode,
    pub settings: &'a RolloutSettings,
    pub evaluated_at: DateTime<Utc>,
}

/// Evaluate the gate. Pure.
pub fn evaluate_quality_gate(input: GateInput<'_>) -> QualityGateResult {
    let GateInput {
        windows: WindowPair { current, previous },
        window_hours,
        mode,
        settings,
        evaluated_at,
    } = input;
    let slo = &settings.slo;

    let mut result = QualityGateResult {
        evaluated_at: evaluated_at.to_rfc3339(),
        window_hours,
        rollout_mode: mode,
        min_hybrid_samples: settings.min_hybrid_samples,
        min_canary_samples_for_relevance: settings.min_canary_samples_for_relevance,
        status: GateStatus::InsufficientData,
        canary_blocked: false,
        reasons: Vec::new(),
        current,
        previous,
    };

    // Not enough signal either to pass or to block
    if result.current.hybrid_requested < settings.min_hybrid_samples {
        return result;
    }

    let (current, previous) = (&result.current, &result.previous);
    let mut reasons = Vec::new();

    if current.fallback_rate > slo.max_fallback_rate_for_default_on {
        reasons.push(BlockingReason {
            code: reason_codes::FALLBACK_RATE_ABOVE_LIMIT,
            severity: Severity::Critical,
            blocking: true,
            metric: "fallbackRate",
            current_value: current.fallback_rate,
            previous_value: previous.fallback_rate,
            threshold: slo.max_fallback_rate_for_default_on,
            message: format!(
                "fallback rate {:.3} exceeds limit {:.3} ({} of {} hybrid requests)",
                current.fallback_rate,
                slo.max_fallback_rate_for_default_on,
                current.hybrid_fallbacks,
                current.hybrid_requested
            ),
        });
    }

    if current.graph_error_fallback_rate > slo.max_graph_error_rate_for_default_on {
        reasons.push(BlockingReason {
            code: reason_codes::GRAPH_ERROR_RATE_ABOVE_LIMIT,
            severity: Severity::Critical,
            blocking: true,
            metric: "graphErrorFallbackRate",
            current_value: current.graph_error_fallback_rate,
            previous_value: previous.graph_error_fallback_rate,
            threshold: slo.max_graph_error_rate_for_default_on,
            message: format!(
                "graph error rate {:.3} exceeds limit {:.3}",
                current.graph_error_fallback_rate, slo.max_graph_error_rate_for_default_on
            ),
        });
    }

    if current.canary_applied < settings.min_canary_samples_for_relevance {
        reasons.push(BlockingReason {
            code: reason_codes::MIN_CANARY_SAMPLES_NOT_MET,
            severity: Severity::Warning,
            blocking: false,
            metric: "canaryApplied",
            current_value: current.canary_applied as f64,
            previous_value: previous.canary_applied as f64,
            threshold: settings.min_canary_samples_for_relevance as f64,
            message: format!(
                "{} canary requests, need {} to judge expansion quality",
                current.canary_applied, settings.min_canary_samples_for_relevance
            ),
        });
    }

    if current.expansion_coverage_rate < slo.min_expansion_coverage_for_default_on {
        reasons.push(BlockingReason {
            code: reason_codes::EXPANSION_COVERAGE_BELOW_LIMIT,
            severity: Severity::Warning,
            blocking: false,
            metric: "expansionCoverageRate",
            current_value: current.expansion_coverage_rate,
            previous_value: previous.expansion_coverage_rate,
            threshold: slo.min_expansion_coverage_for_default_on,
            message: format!(
                "expansion coverage {:.3} below minimum {:.3}",
                current.expansion_coverage_rate, slo.min_expansion_coverage_for_default_on
            ),
        });
    }

    let failed = reasons
        .iter()
        .any(|r| r.blocking && r.severity == Severity::Critical);
    result.status = if failed {
        GateStatus::Fail
    } else if !reasons.is_empty() {
        GateStatus::Warn
    } else {
        GateStatus::Pass
    };
    result.canary_blocked = result.status == GateStatus::Fail;
    result.reasons = reasons;
    result
}
