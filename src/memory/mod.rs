pub mod graph;
pub mod search;
pub mod store;
pub mod types;
