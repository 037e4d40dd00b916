//! SQLite persistence for rollout config, retrieval policy and raw events.
//!
//! Config and policy are written with a single upsert keyed by tenant so two
//! concurrent evaluations never interleave a read-modify-write.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::memory::store::conversion_error;
use crate::rollout::strategy::parse_strategy;
use crate::rollout::types::{
    PolicyUpdate, RetrievalPolicy, RolloutActor, RolloutConfig, RolloutEvent, RolloutMode,
};

/// Stored config for `scope_key`, or the synthesized `off` default.
pub fn get_rollout_config(conn: &Connection, scope_key: &str) -> Result<RolloutConfig> {
    let row = conn
        .query_row(
            "SELECT mode, updated_at, updated_by FROM rollout_config WHERE scope_key = ?1",
            params![scope_key],
            |row| {
                let mode: String = row.get(0)?;
                Ok(RolloutConfig {
                    mode: mode.parse().map_err(|e: String| conversion_error(0, e))?,
                    updated_at: row.get(1)?,
                    updated_by: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(row.unwrap_or_else(|| RolloutConfig::synthesized(&chrono::Utc::now().to_rfc3339())))
}

/// Upsert the mode for `scope_key` and append to the audit history, atomically.
pub fn set_rollout_config(
    conn: &mut Connection,
    scope_key: &str,
    mode: RolloutMode,
    actor: &RolloutActor,
) -> Result<RolloutConfig> {
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO rollout_config (scope_key, mode, updated_at, updated_by) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(scope_key) DO UPDATE SET \
             mode = excluded.mode, \
             updated_at = excluded.updated_at, \
             updated_by = excluded.updated_by",
        params![scope_key, mode.as_str(), now, actor.id()],
    )?;
    tx.execute(
        "INSERT INTO rollout_config_history (scope_key, mode, updated_by, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![scope_key, mode.as_str(), actor.id(), now],
    )?;
    tx.commit()?;

    Ok(RolloutConfig {
        mode,
        updated_at: now,
        updated_by: Some(actor.id().to_string()),
    })
}

/// One entry of the rollout mode audit trail.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigHistoryEntry {
    pub mode: RolloutMode,
    pub updated_by: Option<String>,
    pub created_at: String,
}

/// Mode changes for `scope_key`, oldest first.
pub fn config_history(conn: &Connection, scope_key: &str) -> Result<Vec<ConfigHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT mode, updated_by, created_at FROM rollout_config_history \
         WHERE scope_key = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![scope_key], |row| {
            let mode: String = row.get(0)?;
            Ok(ConfigHistoryEntry {
                mode: mode.parse().map_err(|e: String| conversion_error(0, e))?,
                updated_by: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_retrieval_policy(conn: &Connection, scope_key: &str) -> Result<RetrievalPolicy> {
    let row = conn
        .query_row(
            "SELECT default_strategy, ready_window_streak, last_decision, last_evaluated_at, \
                    updated_at, updated_by, last_gate_status \
             FROM retrieval_policy WHERE scope_key = ?1",
            params![scope_key],
            policy_from_row,
        )
        .optional()?;

    Ok(row.unwrap_or_else(|| RetrievalPolicy::synthesized(&chrono::Utc::now().to_rfc3339())))
}

/// Replace the policy for `scope_key` in one statement: strategy, streak and
/// decision always land together.
pub fn set_retrieval_policy(
    conn: &Connection,
    scope_key: &str,
    update: &PolicyUpdate,
) -> Result<RetrievalPolicy> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO retrieval_policy \
             (scope_key, default_strategy, ready_window_streak, last_decision, \
              last_evaluated_at, updated_at, updated_by, last_gate_status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(scope_key) DO UPDATE SET \
             default_strategy = excluded.default_strategy, \
             ready_window_streak = excluded.ready_window_streak, \
             last_decision = excluded.last_decision, \
             last_evaluated_at = excluded.last_evaluated_at, \
             updated_at = excluded.updated_at, \
             updated_by = excluded.updated_by, \
             last_gate_status = excluded.last_gate_status",
        params![
            scope_key,
            update.default_strategy.as_str(),
            update.ready_window_streak,
            update.last_decision.as_str(),
            update.evaluated_at,
            now,
            update.updated_by,
            update.gate_status.as_str(),
        ],
    )?;

    Ok(RetrievalPolicy {
        default_strategy: update.default_strategy,
        ready_window_streak: update.ready_window_streak,
        last_decision: Some(update.last_decision),
        last_evaluated_at: Some(update.evaluated_at.clone()),
        last_gate_status: Some(update.gate_status),
        updated_at: now,
        updated_by: Some(update.updated_by.clone()),
    })
}

fn policy_from_row(row: &Row<'_>) -> rusqlite::Result<RetrievalPolicy> {
    let strategy: String = row.get(0)?;
    let decision: Option<String> = row.get(2)?;
    let gate_status: Option<String> = row.get(6)?;
    Ok(RetrievalPolicy {
        default_strategy: parse_strategy(&strategy)
            .map_err(|e| conversion_error(0, e.to_string()))?,
        ready_window_streak: row.get(1)?,
        last_decision: decision
            .map(|d| d.parse())
            .transpose()
            .map_err(|e: String| conversion_error(2, e))?,
        last_evaluated_at: row.get(3)?,
        last_gate_status: gate_status
            .map(|s| s.parse())
            .transpose()
            .map_err(|e: String| conversion_error(6, e))?,
        updated_at: row.get(4)?,
        updated_by: row.get(5)?,
    })
}

pub fn insert_event(conn: &Connection, scope_key: &str, event: &RolloutEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO rollout_events \
             (scope_key, created_at_ms, requested_strategy, applied_strategy, rollout_mode, \
              shadow_executed, canary_applied, fallback_triggered, fallback_reason, \
              baseline_candidates, graph_candidates, graph_expanded_count, total_candidates) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            scope_key,
            event.created_at_ms,
            event.requested_strategy.map(|s| s.as_str()),
            event.applied_strategy.as_str(),
            event.rollout_mode.as_str(),
            event.shadow_executed,
            event.canary_applied,
            event.fallback_triggered,
            event.fallback_reason,
            event.baseline_candidates,
            event.graph_candidates,
            event.graph_expanded_count,
            event.total_candidates,
        ],
    )?;
    Ok(())
}

/// Events for `scope_key` with `from_ms < created_at_ms <= to_ms`, oldest first.
pub fn query_events(
    conn: &Connection,
    scope_key: &str,
    from_ms: i64,
    to_ms: i64,
) -> Result<Vec<RolloutEvent>> {
    let mut stmt = conn.prepare(
        "SELECT created_at_ms, requested_strategy, applied_strategy, rollout_mode, \
                shadow_executed, canary_applied, fallback_triggered, fallback_reason, \
                baseline_candidates, graph_candidates, graph_expanded_count, total_candidates \
         FROM rollout_events \
         WHERE scope_key = ?1 AND created_at_ms > ?2 AND created_at_ms <= ?3 \
         ORDER BY created_at_ms ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![scope_key, from_ms, to_ms], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<RolloutEvent> {
    let requested: Option<String> = row.get(1)?;
    let applied: String = row.get(2)?;
    let mode: String = row.get(3)?;
    Ok(RolloutEvent {
        created_at_ms: row.get(0)?,
        requested_strategy: requested
            .map(|s| parse_strategy(&s))
            .transpose()
            .map_err(|e| conversion_error(1, e.to_string()))?,
        applied_strategy: parse_strategy(&applied).map_err(|e| conversion_error(2, e.to_string()))?,
        rollout_mode: mode.parse().map_err(|e: String| conversion_error(3, e))?,
        shadow_executed: row.get(4)?,
        canary_applied: row.get(5)?,
        fallback_triggered: row.get(6)?,
        fallback_reason: row.get(7)?,
        baseline_candidates: row.get(8)?,
        graph_candidates: row.get(9)?,
        graph_expanded_count: row.get(10)?,
        total_candidates: row.get(11)?,
    })
}
