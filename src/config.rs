use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RecallgateConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scope: ScopeConfig,
    pub retrieval: RetrievalConfig,
    pub rollout: RolloutSettings,
    pub compaction: CompactionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Scope used when a caller does not supply one.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ScopeConfig {
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub default_graph_depth: u8,
    pub default_graph_limit: usize,
    pub rrf_k: usize,
    /// Time budget for a single graph expansion, in milliseconds.
    pub graph_timeout_ms: u64,
    pub suppress_deprecation_warnings: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RolloutSettings {
    pub window_hours: u32,
    pub min_hybrid_samples: u64,
    pub min_canary_samples_for_relevance: u64,
    pub slo: SloThresholds,
    pub autopilot: AutopilotConfig,
}

/// Quality thresholds for canary admission and default-on promotion.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct SloThresholds {
    pub max_fallback_rate_for_default_on: f64,
    pub max_graph_error_rate_for_default_on: f64,
    pub min_expansion_coverage_for_default_on: f64,
    pub min_hybrid_samples_for_default_on: u64,
    pub min_canary_samples_for_default_on: u64,
    pub min_shadow_executions_for_canary: u64,
    pub min_shadow_average_graph_candidates: f64,
    pub max_shadow_graph_error_rate_for_canary: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutopilotConfig {
    pub enabled: bool,
    pub promote_after_ready_windows: u32,
    /// Let autopilot apply the plan's recommended rollout mode as well.
    pub manage_mode: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompactionConfig {
    pub base_tokens: u64,
    pub item_overhead_tokens: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_recallgate_dir()
            .join("recallgate.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 8,
            max_limit: 50,
            default_graph_depth: 1,
            default_graph_limit: 8,
            rrf_k: 60,
            graph_timeout_ms: 250,
            suppress_deprecation_warnings: false,
        }
    }
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            window_hours: 24,
            min_hybrid_samples: 20,
            min_canary_samples_for_relevance: 12,
            slo: SloThresholds::default(),
            autopilot: AutopilotConfig::default(),
        }
    }
}

impl Default for SloThresholds {
    fn default() -> Self {
        Self {
            max_fallback_rate_for_default_on: 0.15,
            max_graph_error_rate_for_default_on: 0.05,
            min_expansion_coverage_for_default_on: 0.10,
            min_hybrid_samples_for_default_on: 20,
            min_canary_samples_for_default_on: 12,
            min_shadow_executions_for_canary: 40,
            min_shadow_average_graph_candidates: 1.0,
            max_shadow_graph_error_rate_for_canary: 0.05,
        }
    }
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            promote_after_ready_windows: 2,
            manage_mode: false,
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            base_tokens: 32,
            item_overhead_tokens: 6,
        }
    }
}

/// Returns `~/.recallgate/`
pub fn default_recallgate_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".recallgate")
}

/// Returns the default config file path: `~/.recallgate/config.toml`
pub fn default_config_path() -> PathBuf {
    default_recallgate_dir().join("config.toml")
}

impl RecallgateConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RecallgateConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RECALLGATE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("RECALLGATE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("RECALLGATE_TENANT_ID") {
            self.scope.tenant_id = non_blank(val);
        }
        if let Ok(val) = std::env::var("RECALLGATE_USER_ID") {
            self.scope.user_id = non_blank(val);
        }
        if let Ok(val) = std::env::var("RECALLGATE_PROJECT_ID") {
            self.scope.project_id = non_blank(val);
        }
        if let Ok(val) = std::env::var("RECALLGATE_SUPPRESS_DEPRECATION_WARNINGS") {
            self.retrieval.suppress_deprecation_warnings =
                matches!(val.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

fn non_blank(val: String) -> Option<String> {
    let trimmed = val.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
