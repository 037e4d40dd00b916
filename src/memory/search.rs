use rusqlite::{params, Connection};
use std::collections::HashMap;

use crate::error::Result;
use crate::memory::store::{aliased_columns, aliased_scope_filter, memory_from_row};
use crate::memory::types::{Candidate, MemoryLayer, Scope};
use crate::rollout::strategy::Strategy;

/// Baseline search request.
#[derive(Debug, Clone)]
pub struct BaselineQuery<'a> {
    /// Free-text query. `None` (or blank) returns the most recently updated memories.
    pub query: Option<&'a str>,
    pub strategy: Strategy,
    /// Restrict to one layer. Rule-layer memories are never baseline candidates.
    pub layer: Option<MemoryLayer>,
    pub limit: usize,
    pub rrf_k: usize,
}

/// Baseline candidates for `scope`, best first.
///
/// - `Lexical`: BM25 over memories containing every query term.
/// - `Semantic`: BM25 over stemmed prefix matches of any query term.
/// - `Hybrid`: both lists fused with Reciprocal Rank Fusion.
pub fn search_baseline(
    conn: &Connection,
    scope: &Scope,
    query: &BaselineQuery<'_>,
) -> Result<Vec<Candidate>> {
    let text = query.query.map(str::trim).filter(|q| !q.is_empty());
    let Some(text) = text else {
        return recent_memories(conn, scope, query.layer, query.limit);
    };

    let candidates = match query.strategy {
        Strategy::Lexical => {
            fts_search(conn, scope, &lexical_match(text), query.layer, query.limit)?
        }
        Strategy::Semantic => {
            fts_search(conn, scope, &semantic_match(text), query.layer, query.limit)?
        }
        Strategy::Hybrid => {
            let pool = query.limit * 3;
            let lexical = fts_search(conn, scope, &lexical_match(text), query.layer, pool)?;
            let semantic = fts_search(conn, scope, &semantic_match(text), query.layer, pool)?;
            let mut fused = rrf_merge(&lexical, &semantic, query.rrf_k);
            fused.truncate(query.limit);
            fused
        }
    };
    Ok(candidates)
}

/// Most recently updated non-rule memories.
fn recent_memories(
    conn: &Connection,
    scope: &Scope,
    layer: Option<MemoryLayer>,
    limit: usize,
) -> Result<Vec<Candidate>> {
    let sql = format!(
        "SELECT {} FROM memories m \
         WHERE m.layer != 'rule' AND {} AND (?4 IS NULL OR m.layer = ?4) \
         ORDER BY m.updated_at DESC, m.id DESC LIMIT ?5",
        aliased_columns("m"),
        aliased_scope_filter("m"),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![
                scope.tenant_id,
                scope.user_id,
                scope.project_id,
                layer.map(|l| l.as_str()),
                limit as i64
            ],
            memory_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let total = rows.len().max(1) as f64;
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(rank, memory)| Candidate {
            memory,
            score: 1.0 - rank as f64 / total,
        })
        .collect())
}

/// FTS5 BM25 search joined against memories for scope and layer filtering.
///
/// bm25() is negative (more negative = better), so it is negated for the score.
fn fts_search(
    conn: &Connection,
    scope: &Scope,
    match_expr: &str,
    layer: Option<MemoryLayer>,
    limit: usize,
) -> Result<Vec<Candidate>> {
    if match_expr.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {}, bm25(memories_fts) AS rank_score \
         FROM memories_fts JOIN memories m ON m.rowid = memories_fts.rowid \
         WHERE memories_fts MATCH ?5 AND m.layer != 'rule' AND {} \
         AND (?4 IS NULL OR m.layer = ?4) \
         ORDER BY rank_score ASC, m.id ASC LIMIT ?6",
        aliased_columns("m"),
        aliased_scope_filter("m"),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![
                scope.tenant_id,
                scope.user_id,
                scope.project_id,
                layer.map(|l| l.as_str()),
                match_expr,
                limit as i64
            ],
            |row| {
                let memory = memory_from_row(row)?;
                let rank: f64 = row.get(11)?;
                Ok(Candidate {
                    memory,
                    score: -rank,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Terms of a user query, stripped of FTS5 syntax characters.
fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Every term must match (implicit AND).
fn lexical_match(query: &str) -> String {
    query_terms(query)
        .into_iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Any term may match, with prefix expansion.
fn semantic_match(query: &str) -> String {
    query_terms(query)
        .into_iter()
        .map(|t| format!("\"{t}\"*"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Reciprocal Rank Fusion merge.
///
/// Memories appearing in both lists get additive scores. Ties break on memory id
/// so the fused order is deterministic.
fn rrf_merge(lexical: &[Candidate], semantic: &[Candidate], k: usize) -> Vec<Candidate> {
    let mut scores: HashMap<&str, (f64, &Candidate)> = HashMap::new();

    for list in [lexical, semantic] {
        for (rank, candidate) in list.iter().enumerate() {
            let entry = scores
                .entry(candidate.memory.id.as_str())
                .or_insert((0.0, candidate));
            entry.0 += 1.0 / (k as f64 + rank as f64 + 1.0);
        }
    }

    let mut merged: Vec<Candidate> = scores
        .into_values()
        .map(|(score, candidate)| Candidate {
            memory: candidate.memory.clone(),
            score,
        })
        .collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    merged
}
