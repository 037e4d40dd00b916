//! Context retrieval orchestration.
//!
//! One [`get_context`] call resolves the effective strategy, runs baseline
//! retrieval, runs graph expansion when the tenant's rollout mode allows it,
//! merges the results with provenance, records one rollout event and stamps the
//! bundle with compaction guidance.
//!
//! Baseline retrieval is mandatory and its errors propagate. Graph expansion and
//! telemetry are enhancements: their failures degrade the response, never fail it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::RecallgateConfig;
use crate::context::session::{
    estimate_tokens, evaluate_compaction, ContextSessionState, SessionSignals,
};
use crate::error::{RecallError, Result};
use crate::memory::graph::{CancelToken, ExpansionRequest, MAX_GRAPH_DEPTH, MAX_GRAPH_LIMIT};
use crate::memory::search::BaselineQuery;
use crate::memory::types::{Candidate, GraphCandidate, Memory, MemoryLayer, Scope, SkillFile};
use crate::rollout::quality_gate::GateStatus;
use crate::rollout::strategy::{self, Strategy};
use crate::rollout::types::{RolloutEvent, RolloutMode};
use crate::storage::{Storage, TelemetrySink};

/// Which memories a context request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    #[default]
    All,
    Working,
    LongTerm,
    /// Rules only; no retrieval, no rollout event.
    RulesOnly,
}

impl ContextMode {
    fn layer(&self) -> Option<MemoryLayer> {
        match self {
            Self::Working => Some(MemoryLayer::Working),
            Self::LongTerm => Some(MemoryLayer::LongTerm),
            Self::All | Self::RulesOnly => None,
        }
    }
}

impl std::str::FromStr for ContextMode {
    type Err = RecallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "all" => Ok(Self::All),
            "working" => Ok(Self::Working),
            "long_term" => Ok(Self::LongTerm),
            "rules_only" => Ok(Self::RulesOnly),
            other => Err(RecallError::validation(
                "INVALID_MODE",
                format!(
                    "unknown context mode: {other}. \
                     Expected all, working, long_term or rules_only"
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextRequest {
    pub query: Option<String>,
    /// Free-form strategy token; `None` uses the tenant's default strategy.
    pub strategy: Option<String>,
    pub mode: ContextMode,
    pub limit: Option<i64>,
    pub graph_depth: Option<i64>,
    pub graph_limit: Option<i64>,
    pub session: Option<SessionSignals>,
    /// Fired by the caller to abandon graph expansion mid-walk.
    pub cancel: Option<CancelToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallSource {
    Baseline,
    GraphExpansion,
}

/// One memory returned to the caller, with how it was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallRecord {
    pub memory_id: String,
    pub source: RecallSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_via_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hop_count: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_memory_id: Option<String>,
    pub memory: Memory,
}

impl RecallRecord {
    fn baseline(candidate: Candidate) -> Self {
        Self {
            memory_id: candidate.memory.id.clone(),
            source: RecallSource::Baseline,
            score: Some(candidate.score),
            linked_via_node: None,
            edge_type: None,
            hop_count: None,
            seed_memory_id: None,
            memory: candidate.memory,
        }
    }

    fn expanded(candidate: GraphCandidate) -> Self {
        Self {
            memory_id: candidate.memory.id.clone(),
            source: RecallSource::GraphExpansion,
            score: None,
            linked_via_node: Some(candidate.linked_via_node),
            edge_type: Some(candidate.edge_type),
            hop_count: Some(candidate.hop_count),
            seed_memory_id: Some(candidate.seed_memory_id),
            memory: candidate.memory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategySource {
    Request,
    PolicyDefault,
}

/// Per-request observability record echoed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTrace {
    pub requested_strategy: Option<Strategy>,
    pub applied_strategy: Strategy,
    pub strategy_source: StrategySource,
    pub deprecated_alias: Option<&'static str>,
    pub graph_depth: u8,
    pub graph_limit: usize,
    pub rollout_mode: RolloutMode,
    pub shadow_executed: bool,
    pub canary_applied: bool,
    pub graph_applied: bool,
    pub quality_gate_status: Option<GateStatus>,
    pub baseline_candidates: u32,
    pub graph_candidates: u32,
    pub graph_expanded_count: u32,
    pub fallback_triggered: bool,
    pub fallback_reason: Option<String>,
    pub total_candidates: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBundle {
    pub rules: Vec<Memory>,
    pub memories: Vec<RecallRecord>,
    pub skill_files: Vec<SkillFile>,
    pub trace: ContextTrace,
    pub session: ContextSessionState,
}

/// Validated numeric knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Knobs {
    limit: usize,
    graph_depth: u8,
    graph_limit: usize,
}

fn resolve_knobs(request: &ContextRequest, config: &RecallgateConfig) -> Result<Knobs> {
    let retrieval = &config.retrieval;
    let max_limit = retrieval.max_limit.max(1);
    let limit = match request.limit {
        None => retrieval.default_limit.clamp(1, max_limit),
        Some(n) if n >= 1 && n as u64 <= max_limit as u64 => n as usize,
        Some(n) => {
            return Err(RecallError::validation(
                "INVALID_LIMIT",
                format!("limit must be between 1 and {max_limit}, got {n}"),
            ))
        }
    };

    let graph_depth = request
        .graph_depth
        .unwrap_or(i64::from(retrieval.default_graph_depth))
        .clamp(0, i64::from(MAX_GRAPH_DEPTH)) as u8;
    let graph_limit = request
        .graph_limit
        .unwrap_or(retrieval.default_graph_limit as i64)
        .clamp(1, MAX_GRAPH_LIMIT as i64) as usize;

    Ok(Knobs {
        limit,
        graph_depth,
        graph_limit,
    })
}

/// Outcome of the optional graph path.
#[derive(Debug, Default)]
struct GraphOutcome {
    attempted: bool,
    candidates: Vec<GraphCandidate>,
    fallback_reason: Option<String>,
}

/// Assemble a context bundle for `scope`.
pub fn get_context(
    storage: &dyn Storage,
    telemetry: &dyn TelemetrySink,
    config: &RecallgateConfig,
    scope: &Scope,
    request: &ContextRequest,
    now: DateTime<Utc>,
) -> Result<ContextBundle> {
    // Everything malformed is rejected before storage is touched
    let knobs = resolve_knobs(request, config)?;

    let explicit = request
        .strategy
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let (requested_strategy, deprecated_alias) = match explicit {
        Some(token) => {
            let normalized = strategy::normalize(Some(token));
            (Some(normalized.strategy), normalized.deprecated_alias)
        }
        None => (None, None),
    };

    let rules = storage.list_rules(scope)?;
    let skill_files = storage.list_skill_files(scope)?;
    let rollout = storage.get_rollout_config(scope)?;
    let policy = storage.get_retrieval_policy(scope)?;
    let (applied_strategy, strategy_source) = match requested_strategy {
        Some(s) => (s, StrategySource::Request),
        None => (policy.default_strategy, StrategySource::PolicyDefault),
    };

    debug!(
        tenant = %scope.tenant_key(),
        strategy = %applied_strategy,
        source = ?strategy_source,
        mode = %rollout.mode,
        "context strategy resolved"
    );

    let mut trace = ContextTrace {
        requested_strategy,
        applied_strategy,
        strategy_source,
        deprecated_alias,
        graph_depth: knobs.graph_depth,
        graph_limit: knobs.graph_limit,
        rollout_mode: rollout.mode,
        shadow_executed: false,
        canary_applied: false,
        graph_applied: false,
        quality_gate_status: None,
        baseline_candidates: 0,
        graph_candidates: 0,
        graph_expanded_count: 0,
        fallback_triggered: false,
        fallback_reason: None,
        total_candidates: 0,
    };

    if request.mode == ContextMode::RulesOnly {
        let session = session_state(config, &rules, &[], &skill_files, request, now);
        return Ok(ContextBundle {
            rules,
            memories: Vec::new(),
            skill_files,
            trace,
            session,
        });
    }

    let baseline = storage.search_baseline_candidates(
        scope,
        &BaselineQuery {
            query: request.query.as_deref(),
            strategy: applied_strategy,
            layer: request.mode.layer(),
            limit: knobs.limit,
            rrf_k: config.retrieval.rrf_k,
        },
    )?;
    trace.baseline_candidates = baseline.len() as u32;

    let graph_eligible = applied_strategy.includes_graph()
        && rollout.mode != RolloutMode::Off
        && knobs.graph_depth > 0;
    let graph = if graph_eligible {
        // Last status the autopilot persisted; None until it has run for this tenant
        trace.quality_gate_status = policy.last_gate_status;
        run_expansion(storage, scope, config, &baseline, &knobs, request)
    } else {
        GraphOutcome::default()
    };

    trace.shadow_executed = graph.attempted && rollout.mode == RolloutMode::Shadow;
    trace.canary_applied = graph.attempted && rollout.mode == RolloutMode::Canary;
    trace.graph_candidates = graph.candidates.len() as u32;
    trace.fallback_triggered = graph.fallback_reason.is_some();
    trace.fallback_reason = graph.fallback_reason;
    trace.graph_applied = trace.canary_applied && !trace.fallback_triggered;

    let graph_candidates = if trace.graph_applied {
        graph.candidates
    } else {
        Vec::new()
    };
    let memories = merge(baseline, graph_candidates);
    trace.graph_expanded_count = memories
        .iter()
        .filter(|r| r.source == RecallSource::GraphExpansion)
        .count() as u32;
    trace.total_candidates = memories.len() as u32;

    record_event(telemetry, scope, &trace, now);

    let session = session_state(config, &rules, &memories, &skill_files, request, now);
    Ok(ContextBundle {
        rules,
        memories,
        skill_files,
        trace,
        session,
    })
}

fn run_expansion(
    storage: &dyn Storage,
    scope: &Scope,
    config: &RecallgateConfig,
    baseline: &[Candidate],
    knobs: &Knobs,
    context: &ContextRequest,
) -> GraphOutcome {
    let seeds: Vec<String> = baseline.iter().map(|c| c.memory.id.clone()).collect();
    let deadline = Instant::now() + Duration::from_millis(config.retrieval.graph_timeout_ms);
    let request = ExpansionRequest {
        seeds: &seeds,
        depth: knobs.graph_depth,
        limit: knobs.graph_limit,
        layer: context.mode.layer(),
        deadline: Some(deadline),
        cancel: context.cancel.as_ref(),
    };

    match storage.expand_graph(scope, &request) {
        Ok(candidates) => GraphOutcome {
            attempted: true,
            candidates,
            fallback_reason: None,
        },
        Err(fault) => {
            warn!(
                tenant = %scope.tenant_key(),
                reason = fault.reason(),
                error = %fault,
                "graph expansion failed, falling back to baseline"
            );
            GraphOutcome {
                attempted: true,
                candidates: Vec::new(),
                fallback_reason: Some(fault.reason().to_string()),
            }
        }
    }
}

/// Baseline first in rank order, then graph candidates not already present.
fn merge(baseline: Vec<Candidate>, graph: Vec<GraphCandidate>) -> Vec<RecallRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::with_capacity(baseline.len() + graph.len());

    for candidate in baseline {
        if seen.insert(candidate.memory.id.clone()) {
            records.push(RecallRecord::baseline(candidate));
        }
    }
    for candidate in graph {
        if seen.insert(candidate.memory.id.clone()) {
            records.push(RecallRecord::expanded(candidate));
        }
    }
    records
}

fn record_event(
    telemetry: &dyn TelemetrySink,
    scope: &Scope,
    trace: &ContextTrace,
    now: DateTime<Utc>,
) {
    let event = RolloutEvent {
        created_at_ms: now.timestamp_millis(),
        requested_strategy: trace.requested_strategy,
        applied_strategy: trace.applied_strategy,
        rollout_mode: trace.rollout_mode,
        shadow_executed: trace.shadow_executed,
        canary_applied: trace.canary_applied,
        fallback_triggered: trace.fallback_triggered,
        fallback_reason: trace.fallback_reason.clone(),
        baseline_candidates: trace.baseline_candidates,
        graph_candidates: trace.graph_candidates,
        graph_expanded_count: trace.graph_expanded_count,
        total_candidates: trace.total_candidates,
    };
    if let Err(e) = telemetry.record_event(scope, &event) {
        warn!(tenant = %scope.tenant_key(), error = %e, "failed to record rollout event");
    }
}

fn session_state(
    config: &RecallgateConfig,
    rules: &[Memory],
    memories: &[RecallRecord],
    skill_files: &[SkillFile],
    request: &ContextRequest,
    now: DateTime<Utc>,
) -> ContextSessionState {
    let tokens = estimate_tokens(
        rules.iter().chain(memories.iter().map(|r| &r.memory)),
        skill_files,
        &config.compaction,
    );
    evaluate_compaction(tokens, request.session.as_ref(), now)
}
