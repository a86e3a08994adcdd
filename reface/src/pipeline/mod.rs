//! Pipeline orchestration.

mod orchestrator;
mod state;

pub use orchestrator::{Pipeline, RejectHook, RunOutcome, RunReport};
pub use state::PipelineState;
