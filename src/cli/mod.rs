pub mod add;
pub mod context;
pub mod doctor;
pub mod rollout;

use anyhow::Result;

use crate::config::RecallgateConfig;
use crate::memory::types::Scope;
use crate::rollout::strategy;
use crate::storage::SqliteStorage;

/// Command-line scope flags win over config and environment.
pub fn apply_scope_overrides(
    config: &mut RecallgateConfig,
    tenant: Option<String>,
    user: Option<String>,
    project: Option<String>,
) {
    if tenant.is_some() {
        config.scope.tenant_id = tenant;
    }
    if user.is_some() {
        config.scope.user_id = user;
    }
    if project.is_some() {
        config.scope.project_id = project;
    }
}

/// Open the configured database for a one-shot command.
pub fn open_storage(config: &RecallgateConfig) -> Result<SqliteStorage> {
    strategy::global().set_suppress_warnings(config.retrieval.suppress_deprecation_warnings);
    SqliteStorage::open(config.resolved_db_path())
}

pub fn scope(config: &RecallgateConfig) -> Scope {
    Scope::new(
        config.scope.tenant_id.clone(),
        config.scope.user_id.clone(),
        config.scope.project_id.clone(),
    )
}

/// Single-line preview of memory content.
pub fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
