//! Backup pipeline
//!
//! Runs the backup stages in order and reports where a run stopped.

mod orchestrator;

pub use orchestrator::{Orchestrator, PipelineSettings, RunReport};
