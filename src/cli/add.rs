//! CLI `add` command: store a memory from the terminal.

use anyhow::{Context, Result};
use clap::Args;

use crate::config::RecallgateConfig;
use crate::memory::store::NewMemory;
use crate::memory::types::{MemoryLayer, MemoryType};
use crate::storage::Storage;

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Memory content
    pub content: String,
    /// rule, decision, fact, note or skill
    #[arg(long = "type", default_value = "note")]
    pub memory_type: String,
    /// working or long_term
    #[arg(long)]
    pub layer: Option<String>,
    /// Tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Skill file path
    #[arg(long)]
    pub path: Option<String>,
}

pub fn add(config: &RecallgateConfig, args: AddArgs) -> Result<()> {
    let memory_type: MemoryType = args.memory_type.parse().map_err(anyhow::Error::msg)?;
    let layer: Option<MemoryLayer> = args
        .layer
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let storage = super::open_storage(config)?;
    let memory = storage
        .add_memory(
            &super::scope(config),
            &NewMemory {
                content: args.content,
                memory_type,
                layer,
                tags: args.tags,
                path: args.path,
            },
        )
        .context("failed to store memory")?;

    println!("Stored {} [{} / {}]", memory.id, memory.memory_type, memory.layer);
    if !memory.tags.is_empty() {
        println!("  tags: {}", memory.tags.join(", "));
    }
    Ok(())
}
