//! Query Executor
//!
//! Guards, limits and runs one SQL statement, streaming the full result into
//! a Parquet artifact. Only a summary goes back to the reasoning model.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use analytics_agent_core::{AnalysisArtifact, ColumnSchema, CoreResult};
use analytics_agent_tools::sql_guard::{apply_row_limit, ensure_read_only};

use crate::services::analytics_db::AnalyticsDatabase;
use crate::services::artifacts::{ArtifactStore, ParquetExporter, PendingFile};

/// What `query-execute` reports for a successful statement.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySummary {
    pub row_count: u64,
    pub columns: Vec<ColumnSchema>,
    pub sample_rows: Vec<Map<String, Value>>,
    #[serde(skip)]
    pub artifact: AnalysisArtifact,
    pub executed_sql: String,
    /// The automatic row limit was added and reached.
    pub truncated: bool,
}

impl QuerySummary {
    /// Tool output handed to the reasoning model.
    pub fn to_output(&self) -> Value {
        let artifact = self.artifact.to_ref();
        serde_json::json!({
            "row_count": self.row_count,
            "columns": self.columns,
            "sample_rows": self.sample_rows,
            "artifact_handle": artifact.handle,
            "expires_at": artifact.expires_at.to_rfc3339(),
            "executed_sql": self.executed_sql,
            "truncated": self.truncated,
        })
    }
}

pub struct QueryExecutor {
    db: Arc<dyn AnalyticsDatabase>,
    artifacts: Arc<ArtifactStore>,
    row_limit: u64,
    sample_rows: usize,
}

impl QueryExecutor {
    pub fn new(
        db: Arc<dyn AnalyticsDatabase>,
        artifacts: Arc<ArtifactStore>,
        row_limit: u64,
        sample_rows: usize,
    ) -> Self {
        Self {
            db,
            artifacts,
            row_limit,
            sample_rows,
        }
    }

    /// Run `sql` on behalf of `session_id`.
    ///
    /// Rejected statements never reach the database. A failed run leaves no
    /// file behind.
    pub async fn execute(&self, session_id: &str, sql: &str) -> CoreResult<QuerySummary> {
        let statement = ensure_read_only(sql)?;
        let (executed_sql, limit_added) = apply_row_limit(&statement, self.row_limit);

        let (handle, path) = self.artifacts.allocate();
        let pending = PendingFile::new(path.clone());
        let mut exporter = ParquetExporter::new(&path, self.sample_rows);

        let started = std::time::Instant::now();
        let streamed = self.db.stream_query(&executed_sql, &mut exporter).await?;
        let export = exporter.finish()?;
        let path = pending.keep();

        tracing::info!(
            session_id,
            artifact = %handle,
            rows = streamed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query materialized"
        );

        let artifact = self.artifacts.register(
            handle,
            session_id,
            path,
            export.row_count,
            export.columns.clone(),
        );

        Ok(QuerySummary {
            row_count: export.row_count,
            columns: export.columns,
            sample_rows: export.sample_rows,
            artifact,
            executed_sql,
            truncated: limit_added && export.row_count >= self.row_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use analytics_agent_core::CoreError;

    use crate::services::analytics_db::{RowSink, TableInfo};

    struct FakeDb {
        calls: AtomicUsize,
        rows: usize,
        fail_after: Option<usize>,
        last_sql: std::sync::Mutex<String>,
    }

    impl FakeDb {
        fn new(rows: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                rows,
                fail_after: None,
                last_sql: std::sync::Mutex::new(String::new()),
            }
        }
    }

    #[async_trait]
    impl AnalyticsDatabase for FakeDb {
        async fn list_tables(&self) -> CoreResult<Vec<TableInfo>> {
            Ok(Vec::new())
        }

        async fn stream_query(&self, sql: &str, sink: &mut dyn RowSink) -> CoreResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_sql.lock().unwrap() = sql.to_string();
            sink.begin(&[
                ColumnSchema::new("region", "String"),
                ColumnSchema::new("revenue", "Float64"),
            ])?;
            for i in 0..self.rows {
                if self.fail_after == Some(i) {
                    return Err(CoreError::query_failed("Code: 159. Timeout exceeded"));
                }
                sink.push_row(vec![json!(format!("r{}", i)), json!(i as f64)])?;
            }
            Ok(self.rows as u64)
        }

        async fn ping(&self) -> CoreResult<()> {
            Ok(())
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn executor(db: Arc<FakeDb>, dir: &std::path::Path, row_limit: u64) -> QueryExecutor {
        let store = Arc::new(ArtifactStore::new(dir, Duration::from_secs(3600)).unwrap());
        QueryExecutor::new(db, store, row_limit, 5)
    }

    #[tokio::test]
    async fn test_execute_materializes_artifact() {
        let temp = tempfile::tempdir().unwrap();
        let db = Arc::new(FakeDb::new(12));
        let exec = executor(db.clone(), temp.path(), 50_000);

        let summary = exec.execute("s1", "SELECT region, revenue FROM sales").await.unwrap();
        assert_eq!(summary.row_count, 12);
        assert_eq!(summary.sample_rows.len(), 5);
        assert!(!summary.truncated);
        assert!(summary.artifact.path.is_file());
        assert_eq!(summary.executed_sql, "SELECT region, revenue FROM sales\nLIMIT 50000");
        assert_eq!(*db.last_sql.lock().unwrap(), summary.executed_sql);

        let output = summary.to_output();
        assert_eq!(output["row_count"], 12);
        assert_eq!(output["columns"][1]["type"], "Float64");
        assert!(output["artifact_handle"].as_str().unwrap().starts_with("art_"));
    }

    #[tokio::test]
    async fn test_rejected_statement_never_reaches_database() {
        let temp = tempfile::tempdir().unwrap();
        let db = Arc::new(FakeDb::new(1));
        let exec = executor(db.clone(), temp.path(), 100);

        let err = exec.execute("s1", "DROP TABLE sales").await.unwrap_err();
        assert!(matches!(err, CoreError::QueryRejected(_)));
        assert_eq!(db.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_truncated_when_limit_reached() {
        let temp = tempfile::tempdir().unwrap();
        let db = Arc::new(FakeDb::new(10));
        let exec = executor(db, temp.path(), 10);
        let summary = exec.execute("s1", "SELECT * FROM sales").await.unwrap();
        assert!(summary.truncated);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_file() {
        let temp = tempfile::tempdir().unwrap();
        let mut fake = FakeDb::new(10);
        fake.fail_after = Some(3);
        let exec = executor(Arc::new(fake), temp.path(), 100);

        let err = exec.execute("s1", "SELECT * FROM sales").await.unwrap_err();
        assert!(matches!(err, CoreError::QueryFailed(_)));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
