// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod digest;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod publish;
pub mod rank;
pub mod store;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, KeywordConfig, RunSettings};
pub use crate::pipeline::{Collector, CycleOutcome};
pub use crate::store::Store;
