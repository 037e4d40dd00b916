//! Graph expansion over shared nodes.
//!
//! Memories are attached to nodes (`topic:<tag>`, `path:<dir>`, or anything added
//! through `link_memory`). Two memories attached to the same node are neighbours;
//! expansion walks that relation breadth-first from a set of seed memories.

use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::ExpansionFault;
use crate::memory::store::{aliased_columns, aliased_scope_filter, memory_from_row};
use crate::memory::types::{GraphCandidate, MemoryLayer, Scope};

/// Hard ceiling on expansion depth.
pub const MAX_GRAPH_DEPTH: u8 = 2;
/// Hard ceiling on expansion results.
pub const MAX_GRAPH_LIMIT: usize = 50;

/// Shared flag that aborts an in-flight expansion. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct ExpansionRequest<'a> {
    /// Seed memory ids, in baseline rank order.
    pub seeds: &'a [String],
    pub depth: u8,
    pub limit: usize,
    pub layer: Option<MemoryLayer>,
    /// Abort with [`ExpansionFault::Timeout`] once this instant has passed.
    pub deadline: Option<Instant>,
    /// Abort with [`ExpansionFault::Cancelled`] once this token fires.
    pub cancel: Option<&'a CancelToken>,
}

/// Walk the node graph from `request.seeds`.
///
/// Results are ordered by hop, then by the frontier order that reached them, then
/// by recency; seeds themselves are never returned. Each memory appears at most
/// once, attributed to the first seed that reached it.
pub fn expand_graph(
    conn: &Connection,
    scope: &Scope,
    request: &ExpansionRequest<'_>,
) -> Result<Vec<GraphCandidate>, ExpansionFault> {
    let depth = request.depth.min(MAX_GRAPH_DEPTH);
    let limit = request.limit.min(MAX_GRAPH_LIMIT);
    if depth == 0 || limit == 0 || request.seeds.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {}, src.node_type, src.node_key, dst.edge_type \
         FROM memory_edges src \
         JOIN memory_edges dst ON dst.node_type = src.node_type AND dst.node_key = src.node_key \
              AND dst.memory_id != src.memory_id \
         JOIN memories m ON m.id = dst.memory_id \
         WHERE src.memory_id = ?4 AND m.layer != 'rule' AND {} \
         AND (?5 IS NULL OR m.layer = ?5) \
         ORDER BY src.node_type ASC, src.node_key ASC, m.updated_at DESC, m.id ASC",
        aliased_columns("m"),
        aliased_scope_filter("m"),
    );
    let mut stmt = conn.prepare(&sql)?;

    let mut visited: HashSet<String> = request.seeds.iter().cloned().collect();
    // (memory id, originating seed id)
    let mut frontier: Vec<(String, String)> = request
        .seeds
        .iter()
        .map(|id| (id.clone(), id.clone()))
        .collect();
    let mut found: Vec<GraphCandidate> = Vec::new();

    for hop in 1..=depth {
        let mut next = Vec::new();
        for (memory_id, seed_id) in &frontier {
            if request.cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(ExpansionFault::Cancelled);
            }
            if request.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(ExpansionFault::Timeout);
            }

            let neighbours = stmt
                .query_map(
                    params![
                        scope.tenant_id,
                        scope.user_id,
                        scope.project_id,
                        memory_id,
                        request.layer.map(|l| l.as_str())
                    ],
                    |row| {
                        let memory = memory_from_row(row)?;
                        let node_type: String = row.get(11)?;
                        let node_key: String = row.get(12)?;
                        let edge_type: String = row.get(13)?;
                        Ok((memory, format!("{node_type}:{node_key}"), edge_type))
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;

            for (memory, linked_via_node, edge_type) in neighbours {
                if !visited.insert(memory.id.clone()) {
                    continue;
                }
                next.push((memory.id.clone(), seed_id.clone()));
                found.push(GraphCandidate {
                    memory,
                    seed_memory_id: seed_id.clone(),
                    linked_via_node,
                    edge_type,
                    hop_count: hop,
                });
                if found.len() >= limit {
                    return Ok(found);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    Ok(found)
}
