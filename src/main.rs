mod cli;
mod server;
mod tools;

use recallgate::{config, context, error, memory, rollout, storage};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "recallgate",
    version,
    about = "Context store for AI coding agents with gated graph retrieval rollout"
)]
struct Cli {
    /// Tenant to act as (overrides config and RECALLGATE_TENANT_ID)
    #[arg(long, global = true)]
    tenant: Option<String>,
    #[arg(long, global = true)]
    user: Option<String>,
    #[arg(long, global = true)]
    project: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport)
    Serve,
    /// Store a memory
    Add(cli::add::AddArgs),
    /// Assemble a context bundle from the terminal
    Context(cli::context::ContextArgs),
    /// Inspect and manage graph retrieval rollout
    Rollout {
        #[command(subcommand)]
        action: cli::rollout::RolloutAction,
    },
    /// Run database diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::RecallgateConfig::load()?;
    cli::apply_scope_overrides(&mut config, cli.tenant, cli.user, cli.project);

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve_stdio(config).await?,
        Command::Add(args) => cli::add::add(&config, args)?,
        Command::Context(args) => cli::context::context(&config, args)?,
        Command::Rollout { action } => cli::rollout::rollout(&config, action)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
