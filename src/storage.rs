//! Storage collaborator interfaces and the SQLite implementation.
//!
//! The rollout controller never touches SQL directly: it reads and writes through
//! [`Storage`] and reports events through [`TelemetrySink`]. Both traits are
//! synchronous; async callers go through `tokio::task::spawn_blocking`.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::db;
use crate::error::{ExpansionFault, RecallError, Result};
use crate::memory::graph::{self, ExpansionRequest};
use crate::memory::search::{self, BaselineQuery};
use crate::memory::store::{self, LinkResult, NewMemory};
use crate::memory::types::{Candidate, GraphCandidate, Memory, Scope, SkillFile};
use crate::rollout::store as rollout_store;
use crate::rollout::types::{
    PolicyUpdate, RetrievalPolicy, RolloutActor, RolloutConfig, RolloutEvent, RolloutMode,
};

pub trait Storage: Send + Sync {
    /// Stored config, or a synthesized `off` default. Never fails for a missing row.
    fn get_rollout_config(&self, scope: &Scope) -> Result<RolloutConfig>;

    /// Upsert keyed by tenant.
    fn set_rollout_config(
        &self,
        scope: &Scope,
        mode: RolloutMode,
        actor: &RolloutActor,
    ) -> Result<RolloutConfig>;

    /// Events with `from_ms < created_at_ms <= to_ms`.
    fn query_rollout_events(&self, scope: &Scope, from_ms: i64, to_ms: i64)
        -> Result<Vec<RolloutEvent>>;

    fn get_retrieval_policy(&self, scope: &Scope) -> Result<RetrievalPolicy>;

    /// Upsert keyed by tenant; every field of `update` is written together.
    fn set_retrieval_policy(&self, scope: &Scope, update: &PolicyUpdate) -> Result<RetrievalPolicy>;

    fn search_baseline_candidates(
        &self,
        scope: &Scope,
        query: &BaselineQuery<'_>,
    ) -> Result<Vec<Candidate>>;

    fn expand_graph(
        &self,
        scope: &Scope,
        request: &ExpansionRequest<'_>,
    ) -> std::result::Result<Vec<GraphCandidate>, ExpansionFault>;

    fn list_rules(&self, scope: &Scope) -> Result<Vec<Memory>>;

    fn list_skill_files(&self, scope: &Scope) -> Result<Vec<SkillFile>>;

    fn add_memory(&self, scope: &Scope, new: &NewMemory) -> Result<Memory>;

    /// Fails with `NotFound` when the memory is not visible in `scope`.
    fn link_memory(
        &self,
        scope: &Scope,
        memory_id: &str,
        node_type: &str,
        node_key: &str,
        edge_type: &str,
    ) -> Result<LinkResult>;
}

/// Fire-and-forget receiver of one event per retrieval call.
pub trait TelemetrySink: Send + Sync {
    fn record_event(&self, scope: &Scope, event: &RolloutEvent) -> Result<()>;
}

/// [`Storage`] and [`TelemetrySink`] over a single SQLite connection.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (or create) the database file, applying schema and migrations.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(db::open_database(path)?))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(db::open_memory_database()?))
    }

    pub fn health(&self) -> anyhow::Result<db::HealthReport> {
        let conn = self.lock()?;
        db::check_database_health(&conn)
    }

    pub fn config_history(&self, scope: &Scope) -> Result<Vec<rollout_store::ConfigHistoryEntry>> {
        let conn = self.lock()?;
        rollout_store::config_history(&conn, scope.tenant_key())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RecallError::Storage(format!("database lock poisoned: {e}")))
    }
}

impl Storage for SqliteStorage {
    fn get_rollout_config(&self, scope: &Scope) -> Result<RolloutConfig> {
        let conn = self.lock()?;
        rollout_store::get_rollout_config(&conn, scope.tenant_key())
    }

    fn set_rollout_config(
        &self,
        scope: &Scope,
        mode: RolloutMode,
        actor: &RolloutActor,
    ) -> Result<RolloutConfig> {
        let mut conn = self.lock()?;
        rollout_store::set_rollout_config(&mut conn, scope.tenant_key(), mode, actor)
    }

    fn query_rollout_events(
        &self,
        scope: &Scope,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<RolloutEvent>> {
        let conn = self.lock()?;
        rollout_store::query_events(&conn, scope.tenant_key(), from_ms, to_ms)
    }

    fn get_retrieval_policy(&self, scope: &Scope) -> Result<RetrievalPolicy> {
        let conn = self.lock()?;
        rollout_store::get_retrieval_policy(&conn, scope.tenant_key())
    }

    fn set_retrieval_policy(
        &self,
        scope: &Scope,
        update: &PolicyUpdate,
    ) -> Result<RetrievalPolicy> {
        let conn = self.lock()?;
        rollout_store::set_retrieval_policy(&conn, scope.tenant_key(), update)
    }

    fn search_baseline_candidates(
        &self,
        scope: &Scope,
        query: &BaselineQuery<'_>,
    ) -> Result<Vec<Candidate>> {
        let conn = self.lock()?;
        search::search_baseline(&conn, scope, query)
    }

    fn expand_graph(
        &self,
        scope: &Scope,
        request: &ExpansionRequest<'_>,
    ) -> std::result::Result<Vec<GraphCandidate>, ExpansionFault> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ExpansionFault::Storage(format!("database lock poisoned: {e}")))?;
        graph::expand_graph(&conn, scope, request)
    }

    fn list_rules(&self, scope: &Scope) -> Result<Vec<Memory>> {
        let conn = self.lock()?;
        store::list_rules(&conn, scope)
    }

    fn list_skill_files(&self, scope: &Scope) -> Result<Vec<SkillFile>> {
        let conn = self.lock()?;
        store::list_skill_files(&conn, scope)
    }

    fn add_memory(&self, scope: &Scope, new: &NewMemory) -> Result<Memory> {
        let mut conn = self.lock()?;
        store::add_memory(&mut conn, scope, new)
    }

    fn link_memory(
        &self,
        scope: &Scope,
        memory_id: &str,
        node_type: &str,
        node_key: &str,
        edge_type: &str,
    ) -> Result<LinkResult> {
        let conn = self.lock()?;
        store::link_memory(&conn, scope, memory_id, node_type, node_key, edge_type)
    }
}

impl TelemetrySink for SqliteStorage {
    fn record_event(&self, scope: &Scope, event: &RolloutEvent) -> Result<()> {
        let conn = self.lock()?;
        rollout_store::insert_event(&conn, scope.tenant_key(), event)
    }
}
