//! Services
//!
//! - `analytics_db` - warehouse access (`AnalyticsDatabase`, ClickHouse)
//! - `artifacts` - Parquet artifacts and their TTL sweep
//! - `schema` - schema introspection
//! - `query_executor` - guarded query execution into artifacts
//! - `session_store` - conversation history and per-session locks
//! - `orchestrator` - the reasoning/tool loop
//! - `assembler` - run outcome to HTTP response

pub mod analytics_db;
pub mod artifacts;
pub mod assembler;
pub mod orchestrator;
pub mod query_executor;
pub mod schema;
pub mod session_store;
