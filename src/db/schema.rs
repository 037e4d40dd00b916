//! SQL DDL for all recallgate tables.
//!
//! Defines `memories`, `memories_fts` (FTS5), `memory_edges` (graph), the rollout
//! state tables (`rollout_config`, `rollout_config_history`, `retrieval_policy`),
//! the raw `rollout_events` log and `schema_meta`. All DDL uses `IF NOT EXISTS`
//! for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Memories: rules, decisions, facts, notes, skills
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL CHECK(type IN ('rule','decision','fact','note','skill')),
    layer TEXT NOT NULL DEFAULT 'long_term' CHECK(layer IN ('rule','working','long_term')),
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    path TEXT,
    tenant_id TEXT,
    user_id TEXT,
    project_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);
CREATE INDEX IF NOT EXISTS idx_memories_layer ON memories(layer);
CREATE INDEX IF NOT EXISTS idx_memories_tenant ON memories(tenant_id);
CREATE INDEX IF NOT EXISTS idx_memories_updated ON memories(updated_at);

-- Full-text search (BM25)
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    tags,
    id UNINDEXED,
    content='memories',
    content_rowid='rowid',
    tokenize='porter unicode61'
);

-- Memory-to-node edges; two memories sharing a node are graph neighbours
CREATE TABLE IF NOT EXISTS memory_edges (
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    node_type TEXT NOT NULL,
    node_key TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (memory_id, node_type, node_key, edge_type)
);

CREATE INDEX IF NOT EXISTS idx_edges_node ON memory_edges(node_type, node_key);

-- Per-tenant rollout mode
CREATE TABLE IF NOT EXISTS rollout_config (
    scope_key TEXT PRIMARY KEY,
    mode TEXT NOT NULL CHECK(mode IN ('off','shadow','canary')),
    updated_at TEXT NOT NULL,
    updated_by TEXT
);

-- Append-only audit trail of rollout mode changes
CREATE TABLE IF NOT EXISTS rollout_config_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope_key TEXT NOT NULL,
    mode TEXT NOT NULL,
    updated_by TEXT,
    created_at TEXT NOT NULL
);

-- Per-tenant default strategy and autopilot streak
CREATE TABLE IF NOT EXISTS retrieval_policy (
    scope_key TEXT PRIMARY KEY,
    default_strategy TEXT NOT NULL CHECK(default_strategy IN ('lexical','hybrid')),
    ready_window_streak INTEGER NOT NULL DEFAULT 0,
    last_decision TEXT,
    last_evaluated_at TEXT,
    updated_at TEXT NOT NULL,
    updated_by TEXT,
    last_gate_status TEXT
);

-- Raw per-request retrieval events, aggregated into metrics windows on demand
CREATE TABLE IF NOT EXISTS rollout_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope_key TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    requested_strategy TEXT,
    applied_strategy TEXT NOT NULL,
    rollout_mode TEXT NOT NULL,
    shadow_executed INTEGER NOT NULL DEFAULT 0,
    canary_applied INTEGER NOT NULL DEFAULT 0,
    fallback_triggered INTEGER NOT NULL DEFAULT 0,
    fallback_reason TEXT,
    baseline_candidates INTEGER NOT NULL DEFAULT 0,
    graph_candidates INTEGER NOT NULL DEFAULT 0,
    graph_expanded_count INTEGER NOT NULL DEFAULT 0,
    total_candidates INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_rollout_events_scope_time
    ON rollout_events(scope_key, created_at_ms);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "memories",
            "memories_fts",
            "memory_edges",
            "rollout_config",
            "rollout_config_history",
            "retrieval_policy",
            "rollout_events",
            "schema_meta",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }
}
