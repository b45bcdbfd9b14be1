//! Data Models
//!
//! Configuration and HTTP response structures.

pub mod response;
pub mod settings;

pub use response::*;
pub use settings::*;
