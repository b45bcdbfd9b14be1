//! Storage Layer
//!
//! Conversation history (SQLite) and configuration loading.

pub mod config;
pub mod database;

pub use config::*;
pub use database::*;
