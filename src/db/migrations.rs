//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(
        schema_version = version,
        target = CURRENT_SCHEMA_VERSION,
        "checking migrations"
    );

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            3 => migrate_v2_to_v3(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: backfill `topic` nodes for memories stored before tags
/// were projected into the graph.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    let rows: Vec<(String, String, String)> = {
        let mut stmt = conn.prepare("SELECT id, tags, created_at FROM memories")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut insert = conn.prepare(
        "INSERT OR IGNORE INTO memory_edges \
             (memory_id, node_type, node_key, edge_type, created_at) \
         VALUES (?1, 'topic', ?2, 'tagged_with', ?3)",
    )?;
    for (id, tags_json, created_at) in rows {
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
        for tag in tags {
            insert.execute(rusqlite::params![id, tag.to_lowercase(), created_at])?;
        }
    }
    Ok(())
}

/// Migration v2 → v3: the policy row caches the last gate status so context
/// requests can report it without aggregating events.
fn migrate_v2_to_v3(conn: &Connection) -> rusqlite::Result<()> {
    // Databases created by a newer init_schema already have the column
    let present: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('retrieval_policy') \
         WHERE name = 'last_gate_status'",
        [],
        |row| row.get(0),
    )?;
    if !present {
        conn.execute_batch("ALTER TABLE retrieval_policy ADD COLUMN last_gate_status TEXT")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn get_schema_version_returns_1_on_fresh_db() {
        let conn = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn run_migrations_upgrades_to_current() {
        let mut conn = test_db();
        run_migrations(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migration_v1_to_v2_backfills_topic_edges() {
        let mut conn = test_db();
        conn.execute(
            "INSERT INTO memories (id, type, layer, content, tags, created_at, updated_at) \
             VALUES ('m1', 'fact', 'long_term', 'uses sqlite', '[\"Storage\",\"db\"]', 't', 't')",
            [],
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        let keys: Vec<String> = conn
            .prepare("SELECT node_key FROM memory_edges WHERE memory_id = 'm1' ORDER BY node_key")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(keys, vec!["db".to_string(), "storage".to_string()]);
    }

    #[test]
    fn migration_v2_to_v3_adds_gate_status_column() {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        // Rebuild the policy table at its v2 shape
        conn.execute_batch(
            "DROP TABLE retrieval_policy;
             CREATE TABLE retrieval_policy (
                 scope_key TEXT PRIMARY KEY,
                 default_strategy TEXT NOT NULL,
                 ready_window_streak INTEGER NOT NULL DEFAULT 0,
                 last_decision TEXT,
                 last_evaluated_at TEXT,
                 updated_at TEXT NOT NULL,
                 updated_by TEXT
             );
             UPDATE schema_meta SET value = '2' WHERE key = 'schema_version';",
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        let columns: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('retrieval_policy') \
                 WHERE name = 'last_gate_status'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(columns, 1);
        assert_eq!(get_schema_version(&conn).unwrap(), 3);
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = test_db();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
