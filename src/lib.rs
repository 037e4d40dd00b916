//! Memory and context store for AI coding agents, with an adaptive rollout
//! controller for graph-expanded retrieval.
//!
//! recallgate stores rules, decisions, facts, notes and skills and returns a
//! ranked context bundle on request. Graph expansion (pulling in memories that
//! share a topic, path or explicit node with the baseline results) is rolled
//! out per tenant through three modes:
//!
//! | Mode | Graph expansion | Response |
//! |------|-----------------|----------|
//! | **off** | never runs | baseline only |
//! | **shadow** | runs for measurement | baseline only |
//! | **canary** | runs for hybrid requests | baseline + expanded |
//!
//! A quality gate over windowed metrics decides whether `canary` may be entered,
//! and an autopilot promotes hybrid retrieval to the tenant default once the gate
//! has held for consecutive windows.
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations and health checks
//! - [`memory`]: memory storage, baseline search and graph expansion
//! - [`rollout`]: strategy normalization, metrics, quality gate and policy engine
//! - [`context`]: context assembly and session compaction guidance
//! - [`storage`]: storage and telemetry interfaces with the SQLite backend

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod memory;
pub mod rollout;
pub mod storage;
