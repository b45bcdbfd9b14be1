//! Analytical Database Access
//!
//! `AnalyticsDatabase` is the seam between the query tools and the
//! warehouse. Results are pushed row by row into a `RowSink` so large result
//! sets never have to sit in memory.

pub mod clickhouse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use analytics_agent_core::{ColumnSchema, CoreResult};

pub use clickhouse::ClickHouseClient;

/// One table and its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Receives a streamed result set.
pub trait RowSink: Send {
    /// Called once with the result header, before any row.
    fn begin(&mut self, columns: &[ColumnSchema]) -> CoreResult<()>;

    /// One row, values in header order.
    fn push_row(&mut self, row: Vec<Value>) -> CoreResult<()>;
}

/// Read-only access to the analytical database.
#[async_trait]
pub trait AnalyticsDatabase: Send + Sync {
    /// Tables of the current database with their columns, in column order.
    async fn list_tables(&self) -> CoreResult<Vec<TableInfo>>;

    /// Run `sql` and stream the result into `sink`. Returns the row count.
    async fn stream_query(&self, sql: &str, sink: &mut dyn RowSink) -> CoreResult<u64>;

    /// Cheap reachability check.
    async fn ping(&self) -> CoreResult<()>;

    /// `host:port/database`, for logs and the info endpoint.
    fn describe(&self) -> String;
}

/// Sink that keeps everything in memory. Used for small metadata queries.
#[derive(Debug, Default)]
pub struct CollectRows {
    pub columns: Vec<ColumnSchema>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSink for CollectRows {
    fn begin(&mut self, columns: &[ColumnSchema]) -> CoreResult<()> {
        self.columns = columns.to_vec();
        Ok(())
    }

    fn push_row(&mut self, row: Vec<Value>) -> CoreResult<()> {
        self.rows.push(row);
        Ok(())
    }
}

/// Group `(table, column, type)` rows into tables, keeping first-seen order.
pub fn group_columns(rows: impl IntoIterator<Item = (String, String, String)>) -> Vec<TableInfo> {
    let mut tables: Vec<TableInfo> = Vec::new();
    for (table, column, data_type) in rows {
        match tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(ColumnSchema::new(column, data_type)),
            _ => {
                if let Some(existing) = tables.iter_mut().find(|t| t.name == table) {
                    existing.columns.push(ColumnSchema::new(column, data_type));
                } else {
                    tables.push(TableInfo {
                        name: table,
                        columns: vec![ColumnSchema::new(column, data_type)],
                    });
                }
            }
        }
    }
    tables
}
