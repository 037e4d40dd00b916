//! MCP `run_autopilot` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::ScopeParams;

/// Parameters for the `run_autopilot` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunAutopilotParams {
    #[serde(flatten)]
    pub scope: ScopeParams,
}
