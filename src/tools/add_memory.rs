//! MCP `add_memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::ScopeParams;

/// Parameters for the `add_memory` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddMemoryParams {
    #[schemars(description = "The content of the memory")]
    pub content: String,

    #[schemars(description = "Memory type: 'rule', 'decision', 'fact', 'note' (default) or 'skill'")]
    pub r#type: Option<String>,

    #[schemars(
        description = "Layer: 'working' or 'long_term' (default). Rules always live in the rule layer."
    )]
    pub layer: Option<String>,

    /// Each tag links the memory to a `topic:<tag>` graph node.
    #[schemars(description = "Tags; memories sharing a tag are graph neighbours")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "File path for skill memories; links the memory to its directory node")]
    pub path: Option<String>,

    #[serde(flatten)]
    pub scope: ScopeParams,
}
