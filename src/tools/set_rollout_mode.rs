//! MCP `set_rollout_mode` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::ScopeParams;

/// Parameters for the `set_rollout_mode` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SetRolloutModeParams {
    #[schemars(description = "Target mode: 'off', 'shadow' or 'canary'. Entering canary requires a passing quality gate.")]
    pub mode: String,

    #[schemars(description = "Operator identity recorded in the audit trail")]
    pub actor: String,

    #[serde(flatten)]
    pub scope: ScopeParams,
}
