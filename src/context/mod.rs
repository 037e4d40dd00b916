//! Context assembly: retrieval orchestration and session compaction guidance.

pub mod orchestrator;
pub mod session;
