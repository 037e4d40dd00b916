//! CLI `context` command: assemble a context bundle from the terminal.

use anyhow::Result;
use clap::Args;

use crate::config::RecallgateConfig;
use crate::context::orchestrator::{get_context, ContextRequest, RecallSource};

#[derive(Debug, Args)]
pub struct ContextArgs {
    /// Free-text query; omit for the most recent memories
    pub query: Option<String>,
    #[arg(long)]
    pub strategy: Option<String>,
    /// all, working, long_term or rules_only
    #[arg(long, default_value = "all")]
    pub mode: String,
    #[arg(long)]
    pub limit: Option<i64>,
    #[arg(long)]
    pub graph_depth: Option<i64>,
    #[arg(long)]
    pub graph_limit: Option<i64>,
    /// Print the full bundle as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn context(config: &RecallgateConfig, args: ContextArgs) -> Result<()> {
    let storage = super::open_storage(config)?;
    let request = ContextRequest {
        query: args.query,
        strategy: args.strategy,
        mode: args.mode.parse()?,
        limit: args.limit,
        graph_depth: args.graph_depth,
        graph_limit: args.graph_limit,
        session: None,
        cancel: None,
    };

    let bundle = get_context(
        &storage,
        &storage,
        config,
        &super::scope(config),
        &request,
        chrono::Utc::now(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    if !bundle.rules.is_empty() {
        println!("Rules:");
        for rule in &bundle.rules {
            println!("  - {}", super::preview(&rule.content, 100));
        }
        println!();
    }

    if bundle.memories.is_empty() {
        println!("No memories found.");
    } else {
        println!("Memories:");
        for (i, record) in bundle.memories.iter().enumerate() {
            let origin = match record.source {
                RecallSource::Baseline => "baseline".to_string(),
                RecallSource::GraphExpansion => format!(
                    "graph via {} ({} hop)",
                    record.linked_via_node.as_deref().unwrap_or("?"),
                    record.hop_count.unwrap_or(0)
                ),
            };
            println!(
                "  {}. [{}] {} ({origin})",
                i + 1,
                record.memory.memory_type,
                record.memory_id
            );
            println!("     {}", super::preview(&record.memory.content, 120));
        }
    }

    let trace = &bundle.trace;
    println!();
    println!(
        "strategy={} mode={} baseline={} graph={} expanded={} fallback={}",
        trace.applied_strategy,
        trace.rollout_mode,
        trace.baseline_candidates,
        trace.graph_candidates,
        trace.graph_expanded_count,
        trace.fallback_reason.as_deref().unwrap_or("none"),
    );
    Ok(())
}
