//! MCP `link_memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::ScopeParams;

/// Parameters for the `link_memory` MCP tool.
///
/// Idempotent on the (memory, node_type, node_key, edge_type) tuple.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LinkMemoryParams {
    #[schemars(description = "ID of the memory to link")]
    pub memory_id: String,

    #[schemars(description = "Node type (e.g. 'repo', 'topic', 'service')")]
    pub node_type: String,

    #[schemars(description = "Node key (e.g. 'acme/api')")]
    pub node_key: String,

    #[schemars(description = "Edge label (e.g. 'belongs_to'). Defaults to 'related_to'.")]
    pub edge_type: Option<String>,

    #[serde(flatten)]
    pub scope: ScopeParams,
}
