// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod scoring;
pub mod source;
pub mod telemetry;
pub mod text;

// ---- Re-exports for stable public API ----
pub use crate::config::{load_config_default, CollectorConfig};
pub use crate::output::OutputStore;
pub use crate::pipeline::{Pipeline, RunSummary, SkipReason, StopReason, VideoOutcome};
pub use crate::scoring::{explain, score, ScoreBreakdown};
pub use crate::source::{memory::MemorySource, ProfileFetcher, VideoSource};
