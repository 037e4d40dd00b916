pub mod add_memory;
pub mod evaluate_rollout;
pub mod get_context;
pub mod link_memory;
pub mod run_autopilot;
pub mod set_rollout_mode;

use add_memory::AddMemoryParams;
use evaluate_rollout::EvaluateRolloutParams;
use get_context::GetContextParams;
use link_memory::LinkMemoryParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use run_autopilot::RunAutopilotParams;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use set_rollout_mode::SetRolloutModeParams;
use std::sync::Arc;

use crate::config::{RecallgateConfig, ScopeConfig};
use crate::context::orchestrator::{self, ContextMode, ContextRequest};
use crate::error::RecallError;
use crate::memory::graph::CancelToken;
use crate::memory::store::NewMemory;
use crate::memory::types::{MemoryLayer, MemoryType, Scope};
use crate::rollout::policy;
use crate::rollout::transition::{self, ModeChange};
use crate::rollout::types::{RolloutActor, RolloutMode};
use crate::storage::{SqliteStorage, Storage};

/// Scope fields accepted by every scoped tool. Missing fields fall back to the
/// configured default scope.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ScopeParams {
    #[schemars(description = "Tenant id. Defaults to the configured tenant.")]
    pub tenant_id: Option<String>,
    #[schemars(description = "User id. Defaults to the configured user.")]
    pub user_id: Option<String>,
    #[schemars(description = "Project id. Defaults to the configured project.")]
    pub project_id: Option<String>,
}

impl ScopeParams {
    pub fn resolve(self, defaults: &ScopeConfig) -> Scope {
        Scope::new(
            self.tenant_id.or_else(|| defaults.tenant_id.clone()),
            self.user_id.or_else(|| defaults.user_id.clone()),
            self.project_id.or_else(|| defaults.project_id.clone()),
        )
    }
}

/// `{type, code, message}` JSON body for a failed tool call.
fn tool_error(err: RecallError) -> String {
    serde_json::to_string(&err.envelope()).unwrap_or_else(|_| err.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| tool_error(e.into()))
}

/// Fires its token when dropped, including when the owning future is dropped
/// mid-await.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// The recallgate MCP tool handler. Holds the storage backend and config and
/// exposes all MCP tools via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct RecallgateTools {
    tool_router: ToolRouter<Self>,
    storage: Arc<SqliteStorage>,
    config: Arc<RecallgateConfig>,
}

impl RecallgateTools {
    /// Run sync storage work off the async runtime.
    async fn blocking<T, F>(&self, work: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStorage, &RecallgateConfig) -> crate::error::Result<T> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || work(&storage, &config))
            .await
            .map_err(|e| tool_error(RecallError::Storage(format!("storage task failed: {e}"))))?
            .map_err(tool_error)
    }
}

#[tool_router]
impl RecallgateTools {
    pub fn new(storage: Arc<SqliteStorage>, config: Arc<RecallgateConfig>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            storage,
            config,
        }
    }

    /// Assemble a ranked context bundle.
    #[tool(description = "Get a context bundle: rules, ranked memories with provenance, skill files, a retrieval trace and compaction guidance.")]
    async fn get_context(
        &self,
        Parameters(params): Parameters<GetContextParams>,
    ) -> Result<String, String> {
        let scope = params.scope.resolve(&self.config.scope);
        let mode: ContextMode = params
            .mode
            .as_deref()
            .unwrap_or("all")
            .parse()
            .map_err(tool_error)?;
        let request = ContextRequest {
            query: params.query,
            strategy: params.strategy,
            mode,
            limit: params.limit,
            graph_depth: params.graph_depth,
            graph_limit: params.graph_limit,
            session: params.session,
            cancel: Some(CancelToken::new()),
        };
        // A dropped tool future (client cancel, shutdown) stops the blocking walk
        let _cancel_on_drop = request.cancel.clone().map(CancelOnDrop);

        tracing::debug!(tenant = %scope.tenant_key(), query = ?request.query, "get_context called");

        let bundle = self
            .blocking(move |storage, config| {
                let now = chrono::Utc::now();
                orchestrator::get_context(storage, storage, config, &scope, &request, now)
            })
            .await?;
        to_json(&bundle)
    }

    /// Store a new memory.
    #[tool(description = "Store a memory. Types: rule (always-on instructions), decision, fact, note, skill. Tags and skill paths become graph links.")]
    async fn add_memory(
        &self,
        Parameters(params): Parameters<AddMemoryParams>,
    ) -> Result<String, String> {
        let invalid =
            |code: &'static str| move |e: String| tool_error(RecallError::validation(code, e));
        let memory_type: MemoryType = params
            .r#type
            .as_deref()
            .unwrap_or("note")
            .parse()
            .map_err(invalid("INVALID_TYPE"))?;
        let layer: Option<MemoryLayer> = params
            .layer
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(invalid("INVALID_LAYER"))?;
        let scope = params.scope.resolve(&self.config.scope);
        let new = NewMemory {
            content: params.content,
            memory_type,
            layer,
            tags: params.tags.unwrap_or_default(),
            path: params.path,
        };

        let memory = self
            .blocking(move |storage, _| storage.add_memory(&scope, &new))
            .await?;
        tracing::info!(id = %memory.id, memory_type = %memory.memory_type, "memory stored");
        to_json(&memory)
    }

    /// Link a memory to a graph node.
    #[tool(description = "Link a memory in your scope to a graph node (e.g. node_type 'repo', node_key 'acme/api'). Memories sharing a node are expanded together.")]
    async fn link_memory(
        &self,
        Parameters(params): Parameters<LinkMemoryParams>,
    ) -> Result<String, String> {
        let edge_type = params.edge_type.unwrap_or_else(|| "related_to".into());
        let scope = params.scope.resolve(&self.config.scope);
        let (memory_id, node_type, node_key) =
            (params.memory_id, params.node_type, params.node_key);
        let link = self
            .blocking(move |storage, _| {
                storage.link_memory(&scope, &memory_id, &node_type, &node_key, &edge_type)
            })
            .await?;
        to_json(&link)
    }

    /// Evaluate the rollout plan without changing anything.
    #[tool(description = "Evaluate graph retrieval rollout for a tenant: quality gate, recommended mode and default-on readiness. Read-only.")]
    async fn evaluate_rollout(
        &self,
        Parameters(params): Parameters<EvaluateRolloutParams>,
    ) -> Result<String, String> {
        let scope = params.scope.resolve(&self.config.scope);
        let window_hours = params.window_hours;
        let plan = self
            .blocking(move |storage, config| {
                let now = chrono::Utc::now();
                policy::evaluate_rollout(storage, &scope, &config.rollout, window_hours, now)
            })
            .await?;
        to_json(&plan)
    }

    /// Change the rollout mode.
    #[tool(description = "Set the graph retrieval rollout mode ('off', 'shadow', 'canary'). Entering canary is rejected with blocker codes when the quality gate fails or lacks data.")]
    async fn set_rollout_mode(
        &self,
        Parameters(params): Parameters<SetRolloutModeParams>,
    ) -> Result<String, String> {
        let mode: RolloutMode = params
            .mode
            .parse()
            .map_err(|e: String| tool_error(RecallError::validation("INVALID_ROLLOUT_MODE", e)))?;
        let actor = params.actor.trim().to_string();
        if actor.is_empty() {
            return Err(tool_error(RecallError::validation(
                "INVALID_ACTOR",
                "actor must not be empty",
            )));
        }
        let scope = params.scope.resolve(&self.config.scope);

        let change = self
            .blocking(move |storage, config| {
                transition::set_rollout_mode(
                    storage,
                    &scope,
                    &config.rollout,
                    mode,
                    &RolloutActor::Operator(actor),
                    chrono::Utc::now(),
                )
            })
            .await?;
        if let ModeChange::Rejected { blocker_codes, .. } = &change {
            tracing::info!(blockers = ?blocker_codes, "set_rollout_mode rejected");
        }
        to_json(&change)
    }

    /// One autopilot pass.
    #[tool(description = "Run the rollout autopilot: evaluate, update the ready-window streak and promote hybrid to the default strategy once quality has held long enough.")]
    async fn run_autopilot(
        &self,
        Parameters(params): Parameters<RunAutopilotParams>,
    ) -> Result<String, String> {
        let scope = params.scope.resolve(&self.config.scope);
        let run = self
            .blocking(move |storage, config| {
                policy::run_autopilot(storage, &scope, &config.rollout, chrono::Utc::now())
            })
            .await?;
        to_json(&run)
    }
}

#[tool_handler]
impl ServerHandler for RecallgateTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "recallgate stores rules, facts, decisions and skills for coding agents. \
                 Use get_context before a task, add_memory to save knowledge, and the rollout \
                 tools to manage graph-expanded retrieval."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
