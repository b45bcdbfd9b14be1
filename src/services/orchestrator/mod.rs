//! Orchestrator
//!
//! The reasoning/tool loop behind `/api/analyze`.

mod context_window;
mod dispatch;
pub mod prompts;
mod service;

pub use context_window::build_history;
pub use dispatch::{Dispatched, ToolDispatcher};
pub use prompts::build_system_prompt;
pub use service::{
    OrchestratorConfig, OrchestratorService, RunFailure, RunOptions, RunOutcome, RunState,
};
