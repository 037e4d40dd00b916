//! Adaptive retrieval rollout: strategy normalization, persisted rollout state,
//! windowed metrics, the quality gate and the policy engine built on top.

pub mod metrics;
pub mod policy;
pub mod quality_gate;
pub mod store;
pub mod strategy;
pub mod transition;
pub mod types;
