//! Analytics Agent - Service Library
//!
//! Conversational analytics over ClickHouse. Provides:
//! - HTTP command handlers and the hyper server
//! - The reasoning/tool orchestrator and its services
//! - Storage layer (SQLite history, configuration)
//! - Data models and utilities

pub mod commands;
pub mod models;
pub mod server;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use commands::{
    analyze, close_session, get_banner, get_chat_stats, get_health, get_info, get_session,
    new_session, CommandResponse,
};
pub use models::response::*;
pub use models::settings::AppConfig;
pub use state::{AppState, Dependencies};
pub use utils::error::{AppError, AppResult};
