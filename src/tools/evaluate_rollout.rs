//! MCP `evaluate_rollout` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::ScopeParams;

/// Parameters for the `evaluate_rollout` MCP tool. Read-only.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EvaluateRolloutParams {
    #[schemars(description = "Metrics window length in hours, 1 to 8760. Defaults to 24.")]
    pub window_hours: Option<u32>,

    #[serde(flatten)]
    pub scope: ScopeParams,
}
