//! MCP server initialization over stdio.
//!
//! [`serve_stdio`] wires the SQLite storage backend and config into the
//! [`RecallgateTools`] handler and runs it until the client disconnects.

use crate::config::RecallgateConfig;
use crate::rollout::strategy;
use crate::storage::SqliteStorage;
use crate::tools::RecallgateTools;
use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::Arc;

/// Shared setup: open the database and apply process-wide settings.
fn setup_shared_state(
    config: RecallgateConfig,
) -> Result<(Arc<SqliteStorage>, Arc<RecallgateConfig>)> {
    let db_path = config.resolved_db_path();
    let storage = SqliteStorage::open(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    strategy::global().set_suppress_warnings(config.retrieval.suppress_deprecation_warnings);

    Ok((Arc::new(storage), Arc::new(config)))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: RecallgateConfig) -> Result<()> {
    anyhow::ensure!(
        config.server.transport == "stdio",
        "unsupported transport '{}': only stdio is available",
        config.server.transport
    );
    tracing::info!("starting recallgate MCP server on stdio");

    let (storage, config) = setup_shared_state(config)?;

    let tools = RecallgateTools::new(storage, config);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}
