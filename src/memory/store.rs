//! Write path and row mapping for memories.
//!
//! [`add_memory`] runs inside a transaction: insert into the memories table, sync
//! the FTS5 index, and project tags and path into graph edges. [`link_memory`]
//! adds explicit edges afterwards.

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;

use crate::error::{RecallError, Result};
use crate::memory::types::{Memory, MemoryLayer, MemoryType, Scope, SkillFile};

/// Column list matching [`memory_from_row`].
pub(crate) const MEMORY_COLUMNS: &str =
    "id, type, layer, content, tags, path, tenant_id, user_id, project_id, created_at, updated_at";

/// SQL predicate restricting rows to what `scope` may see. Binds ?1..?3.
pub(crate) const SCOPE_FILTER: &str = "tenant_id IS ?1 \
     AND (user_id IS NULL OR user_id = ?2) \
     AND (project_id IS NULL OR project_id = ?3)";

/// [`MEMORY_COLUMNS`] qualified with a table alias, for joins.
pub(crate) fn aliased_columns(alias: &str) -> String {
    MEMORY_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// [`SCOPE_FILTER`] qualified with a table alias, for joins.
pub(crate) fn aliased_scope_filter(alias: &str) -> String {
    format!(
        "{alias}.tenant_id IS ?1 \
         AND ({alias}.user_id IS NULL OR {alias}.user_id = ?2) \
         AND ({alias}.project_id IS NULL OR {alias}.project_id = ?3)"
    )
}

/// Input for [`add_memory`].
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub layer: Option<MemoryLayer>,
    pub tags: Vec<String>,
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LinkResult {
    pub memory_id: String,
    pub node: String,
    pub edge_type: String,
    /// `false` if this exact edge already existed.
    pub created: bool,
}

/// Store a memory in `scope`.
pub fn add_memory(conn: &mut Connection, scope: &Scope, new: &NewMemory) -> Result<Memory> {
    let content = new.content.trim();
    if content.is_empty() {
        return Err(RecallError::validation("EMPTY_CONTENT", "content must not be empty"));
    }
    let tags = normalize_tags(&new.tags);
    let path = new
        .path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    let layer = MemoryLayer::resolve(new.memory_type, new.layer);

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let tags_json = serde_json::to_string(&tags)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO memories \
             (id, type, layer, content, tags, path, tenant_id, user_id, project_id, \
              created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            id,
            new.memory_type.as_str(),
            layer.as_str(),
            content,
            tags_json,
            path,
            scope.tenant_id,
            scope.user_id,
            scope.project_id,
            now,
        ],
    )?;
    let rowid = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO memories_fts (rowid, content, tags, id) VALUES (?1, ?2, ?3, ?4)",
        params![rowid, content, tags.join(" "), id],
    )?;

    for tag in &tags {
        insert_edge(&tx, &id, "topic", &tag.to_lowercase(), "tagged_with", &now)?;
    }
    if let Some(dir) = path.as_deref().and_then(parent_dir) {
        insert_edge(&tx, &id, "path", &dir, "located_in", &now)?;
    }

    tx.commit()?;

    tracing::debug!(id = %id, memory_type = %new.memory_type, tags = tags.len(), "memory stored");

    Ok(Memory {
        id,
        memory_type: new.memory_type,
        layer,
        content: content.to_string(),
        tags,
        path,
        tenant_id: scope.tenant_id.clone(),
        user_id: scope.user_id.clone(),
        project_id: scope.project_id.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Attach a memory visible in `scope` to a graph node. Idempotent on the full
/// (memory, node, edge type) tuple.
pub fn link_memory(
    conn: &Connection,
    scope: &Scope,
    memory_id: &str,
    node_type: &str,
    node_key: &str,
    edge_type: &str,
) -> Result<LinkResult> {
    let (node_type, node_key, edge_type) = (node_type.trim(), node_key.trim(), edge_type.trim());
    if node_type.is_empty() || node_key.is_empty() || edge_type.is_empty() {
        return Err(RecallError::validation(
            "INVALID_LINK",
            "node_type, node_key and edge_type must not be empty",
        ));
    }

    // Memories outside the caller's scope are reported as missing
    let sql = format!("SELECT id FROM memories WHERE id = ?4 AND {SCOPE_FILTER}");
    let exists: Option<String> = conn
        .query_row(
            &sql,
            params![scope.tenant_id, scope.user_id, scope.project_id, memory_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(RecallError::NotFound(format!("memory not found: {memory_id}")));
    }

    let now = chrono::Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO memory_edges \
             (memory_id, node_type, node_key, edge_type, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![memory_id, node_type, node_key, edge_type, now],
    )?;

    Ok(LinkResult {
        memory_id: memory_id.to_string(),
        node: format!("{node_type}:{node_key}"),
        edge_type: edge_type.to_string(),
        created: inserted == 1,
    })
}

/// All rule-layer memories visible in `scope`, newest first.
pub fn list_rules(conn: &Connection, scope: &Scope) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE layer = 'rule' AND {SCOPE_FILTER} \
         ORDER BY updated_at DESC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![scope.tenant_id, scope.user_id, scope.project_id],
            memory_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Skill memories that carry a file path.
pub fn list_skill_files(conn: &Connection, scope: &Scope) -> Result<Vec<SkillFile>> {
    let sql = format!(
        "SELECT path, content FROM memories \
         WHERE type = 'skill' AND path IS NOT NULL AND {SCOPE_FILTER} \
         ORDER BY path ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![scope.tenant_id, scope.user_id, scope.project_id],
            |row| {
                Ok(SkillFile {
                    path: row.get(0)?,
                    content: row.get(1)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Map a row selected with [`MEMORY_COLUMNS`] into a [`Memory`].
pub(crate) fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let type_str: String = row.get(1)?;
    let layer_str: String = row.get(2)?;
    let tags_json: String = row.get(4)?;
    Ok(Memory {
        id: row.get(0)?,
        memory_type: type_str.parse().map_err(|e: String| conversion_error(1, e))?,
        layer: layer_str.parse().map_err(|e: String| conversion_error(2, e))?,
        content: row.get(3)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        path: row.get(5)?,
        tenant_id: row.get(6)?,
        user_id: row.get(7)?,
        project_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn insert_edge(
    tx: &Transaction,
    memory_id: &str,
    node_type: &str,
    node_key: &str,
    edge_type: &str,
    now: &str,
) -> Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO memory_edges \
             (memory_id, node_type, node_key, edge_type, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![memory_id, node_type, node_key, edge_type, now],
    )?;
    Ok(())
}

/// Trim tags, drop empties and duplicates (case-insensitive), keep first-seen order.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

fn parent_dir(path: &str) -> Option<String> {
    std::path::Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
}
