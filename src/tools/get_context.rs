//! MCP `get_context` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::context::session::SessionSignals;
use crate::tools::ScopeParams;

/// Parameters for the `get_context` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetContextParams {
    #[schemars(description = "Natural language query. Omit to get the most recently updated memories.")]
    pub query: Option<String>,

    /// Free-form strategy token; unknown values fall back to lexical.
    #[schemars(
        description = "Retrieval strategy: 'lexical', 'semantic' or 'hybrid'. Omit to use the tenant's default strategy."
    )]
    pub strategy: Option<String>,

    #[schemars(description = "Which memories to return: 'all' (default), 'working', 'long_term' or 'rules_only'")]
    pub mode: Option<String>,

    #[schemars(description = "Maximum baseline memories (1-50). Defaults to 8.")]
    pub limit: Option<i64>,

    #[schemars(description = "Graph expansion hops (0-2, clamped). Defaults to 1.")]
    pub graph_depth: Option<i64>,

    #[schemars(description = "Maximum graph-expanded memories (1-50, clamped). Defaults to 8.")]
    pub graph_limit: Option<i64>,

    #[schemars(description = "Client session counters used for compaction guidance")]
    pub session: Option<SessionSignals>,

    #[serde(flatten)]
    pub scope: ScopeParams,
}
