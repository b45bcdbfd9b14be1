//! HTTP Commands
//!
//! One handler per endpoint. Handlers take the shared state and typed
//! input and return typed bodies; routing and JSON encoding live in
//! `server`.

pub mod analyze;
pub mod health;
pub mod sessions;

pub use analyze::*;
pub use health::*;
pub use sessions::*;

/// A body together with the HTTP status it is sent with.
#[derive(Debug, Clone)]
pub struct CommandResponse<T> {
    pub status: u16,
    pub data: T,
}

impl<T> CommandResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { status: 200, data }
    }

    pub fn with_status(status: u16, data: T) -> Self {
        Self { status, data }
    }
}
