//! CLI `rollout` command: inspect and drive the graph retrieval rollout.

use anyhow::Result;
use clap::Subcommand;

use crate::config::RecallgateConfig;
use crate::rollout::policy;
use crate::rollout::quality_gate::QualityGateResult;
use crate::rollout::transition::{self, ModeChange};
use crate::rollout::types::{RolloutActor, RolloutMode};
use crate::storage::Storage;

#[derive(Debug, Subcommand)]
pub enum RolloutAction {
    /// Show the current mode, retrieval policy and mode history
    Status,
    /// Evaluate the quality gate and rollout plan (read-only)
    Evaluate {
        #[arg(long)]
        window_hours: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Set the rollout mode: off, shadow or canary
    Set {
        mode: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Run one autopilot pass
    Autopilot {
        #[arg(long)]
        json: bool,
    },
}

pub fn rollout(config: &RecallgateConfig, action: RolloutAction) -> Result<()> {
    let storage = super::open_storage(config)?;
    let scope = super::scope(config);
    let now = chrono::Utc::now();

    match action {
        RolloutAction::Status => {
            let current = storage.get_rollout_config(&scope)?;
            let policy = storage.get_retrieval_policy(&scope)?;
            println!("Tenant:            {}", scope.tenant_key());
            println!("Mode:              {}", current.mode);
            println!(
                "Updated:           {} by {}",
                current.updated_at,
                current.updated_by.as_deref().unwrap_or("-")
            );
            println!("Default strategy:  {}", policy.default_strategy);
            println!("Ready streak:      {}", policy.ready_window_streak);
            if let Some(decision) = policy.last_decision {
                println!(
                    "Last decision:     {decision} at {}",
                    policy.last_evaluated_at.as_deref().unwrap_or("-")
                );
            }
            if let Some(status) = policy.last_gate_status {
                println!("Last gate status:  {status}");
            }
            let history = storage.config_history(&scope)?;
            if !history.is_empty() {
                println!();
                println!("History:");
                for entry in history {
                    println!(
                        "  {}  {:<7} {}",
                        entry.created_at,
                        entry.mode.as_str(),
                        entry.updated_by.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        RolloutAction::Evaluate { window_hours, json } => {
            let plan =
                policy::evaluate_rollout(&storage, &scope, &config.rollout, window_hours, now)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }
            print_gate(&plan.quality_gate);
            println!();
            println!("Current mode:      {}", plan.current_mode);
            println!("Recommended mode:  {}", plan.recommended_mode);
            println!("Default decision:  {}", plan.default_behavior_decision);
            println!("Ready streak:      {}", plan.ready_window_streak);
            if !plan.blocker_codes.is_empty() {
                println!("Blockers:          {}", plan.blocker_codes.join(", "));
            }
            println!();
            println!("{}", plan.rationale);
        }
        RolloutAction::Set { mode, actor } => {
            let mode: RolloutMode = mode.parse().map_err(anyhow::Error::msg)?;
            let actor = RolloutActor::Operator(actor);
            let change =
                transition::set_rollout_mode(&storage, &scope, &config.rollout, mode, &actor, now)?;
            match change {
                ModeChange::Applied(current) => {
                    println!("Rollout mode is now '{}'", current.mode);
                }
                ModeChange::Rejected { blocker_codes, gate } => {
                    println!("Refused to enter '{mode}': {}", blocker_codes.join(", "));
                    print_gate(&gate);
                }
            }
        }
        RolloutAction::Autopilot { json } => {
            let run = policy::run_autopilot(&storage, &scope, &config.rollout, now)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
                return Ok(());
            }
            println!("Decision:          {}", run.plan.default_behavior_decision);
            println!("Ready streak:      {}", run.policy.ready_window_streak);
            println!("Default strategy:  {}", run.policy.default_strategy);
            if run.plan.autopilot.applied {
                println!("Hybrid promoted to default.");
            }
            if let Some(changed) = run.mode_change {
                println!("Mode changed to '{}'", changed.mode);
            }
        }
    }
    Ok(())
}

fn print_gate(gate: &QualityGateResult) {
    println!("Quality gate:      {} ({}h windows)", gate.status, gate.window_hours);
    println!(
        "  requests:        {} (hybrid {}, canary {})",
        gate.current.total_requests, gate.current.hybrid_requested, gate.current.canary_applied
    );
    println!(
        "  fallback rate:   {:.3}  graph errors: {:.3}",
        gate.current.fallback_rate, gate.current.graph_error_fallback_rate
    );
    for reason in &gate.reasons {
        let marker = if reason.blocking { "!" } else { "-" };
        println!("  {marker} {}: {}", reason.code, reason.message);
    }
}
