//! Query Artifacts
//!
//! `ArtifactStore` owns the Parquet files that hold query results between
//! tool calls. Handles are scoped to the session that created them and
//! expire after a TTL; the background sweep deletes expired files and any
//! orphan files left by crashed runs.
//!
//! `ParquetExporter` is the `RowSink` that writes a streamed result set to
//! disk in record batches.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, StringBuilder,
    TimestampMillisecondBuilder, UInt64Builder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::{Map, Value};

use analytics_agent_core::{AnalysisArtifact, ColumnSchema, CoreError, CoreResult};

use crate::services::analytics_db::RowSink;
use crate::utils::error::AppResult;

const ARTIFACT_EXTENSION: &str = "parquet";
/// Rows buffered before a record batch is written.
pub const BATCH_ROWS: usize = 8192;

// ============================================================================
// ArtifactStore
// ============================================================================

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub orphans: usize,
}

/// Registry of live artifacts and owner of the artifact directory.
pub struct ArtifactStore {
    dir: PathBuf,
    ttl: Duration,
    entries: DashMap<String, AnalysisArtifact>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> AppResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            ttl,
            entries: DashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reserve a fresh handle and the file path its data goes to.
    pub fn allocate(&self) -> (String, PathBuf) {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let handle = format!("art_{}", &id[..16]);
        let path = self.dir.join(format!("{}.{}", handle, ARTIFACT_EXTENSION));
        (handle, path)
    }

    /// Record a fully written artifact.
    pub fn register(
        &self,
        handle: String,
        session_id: &str,
        path: PathBuf,
        row_count: u64,
        columns: Vec<ColumnSchema>,
    ) -> AnalysisArtifact {
        let artifact = AnalysisArtifact {
            handle: handle.clone(),
            session_id: session_id.to_string(),
            path,
            row_count,
            columns,
            created_at: Utc::now(),
            ttl_secs: self.ttl.as_secs(),
        };
        self.entries.insert(handle, artifact.clone());
        artifact
    }

    /// Look up a handle on behalf of `session_id`.
    ///
    /// Handles owned by other sessions are reported exactly like unknown
    /// ones.
    pub fn resolve(&self, session_id: &str, handle: &str) -> CoreResult<AnalysisArtifact> {
        let artifact = self
            .entries
            .get(handle)
            .map(|entry| entry.value().clone())
            .filter(|a| a.session_id == session_id)
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "Unknown artifact handle '{}'. Run query-execute first and pass its artifact_handle.",
                    handle
                ))
            })?;

        if artifact.is_expired(Utc::now()) || !artifact.path.is_file() {
            return Err(CoreError::validation(format!(
                "Artifact '{}' has expired. Re-run the query to get a new handle.",
                handle
            )));
        }
        Ok(artifact)
    }

    /// Delete expired artifacts and orphan files older than the TTL.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();
        for handle in expired {
            if let Some((_, artifact)) = self.entries.remove(&handle) {
                remove_file_quietly(&artifact.path);
                report.expired += 1;
            }
        }

        let cutoff = SystemTime::now().checked_sub(self.ttl);
        if let (Ok(read_dir), Some(cutoff)) = (std::fs::read_dir(&self.dir), cutoff) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
                    continue;
                }
                let known = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| self.entries.contains_key(stem));
                let stale = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .map(|modified| modified < cutoff)
                    .unwrap_or(false);
                if !known && stale {
                    remove_file_quietly(&path);
                    report.orphans += 1;
                }
            }
        }

        if report.expired + report.orphans > 0 {
            tracing::info!(expired = report.expired, orphans = report.orphans, "artifact sweep");
        }
        report
    }

    /// Delete every artifact owned by `session_id`.
    pub fn release_session(&self, session_id: &str) -> usize {
        let owned: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().session_id == session_id)
            .map(|e| e.key().clone())
            .collect();
        let mut released = 0;
        for handle in owned {
            if let Some((_, artifact)) = self.entries.remove(&handle) {
                remove_file_quietly(&artifact.path);
                released += 1;
            }
        }
        released
    }

    /// Delete every registered artifact. Used at shutdown.
    pub fn release_all(&self) -> usize {
        let handles: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        handles
            .iter()
            .filter_map(|handle| self.entries.remove(handle))
            .map(|(_, artifact)| remove_file_quietly(&artifact.path))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete artifact file");
        }
    }
}

/// Deletes a partially written artifact file unless `keep` is called.
pub struct PendingFile {
    path: PathBuf,
    keep: bool,
}

impl PendingFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.keep {
            remove_file_quietly(&self.path);
        }
    }
}

// ============================================================================
// ParquetExporter
// ============================================================================

/// Arrow type used to store a ClickHouse column type.
pub fn arrow_type(clickhouse_type: &str) -> DataType {
    let base = unwrap_type(clickhouse_type);
    match base {
        "Int8" | "Int16" | "Int32" | "Int64" | "UInt8" | "UInt16" | "UInt32" => DataType::Int64,
        "UInt64" => DataType::UInt64,
        "Float32" | "Float64" => DataType::Float64,
        "Bool" | "Boolean" => DataType::Boolean,
        "Date" | "Date32" => DataType::Date32,
        _ if base.starts_with("Decimal") => DataType::Float64,
        _ if base.starts_with("DateTime") => DataType::Timestamp(TimeUnit::Millisecond, None),
        _ => DataType::Utf8,
    }
}

/// Strip `Nullable(...)` and `LowCardinality(...)` wrappers.
fn unwrap_type(mut ty: &str) -> &str {
    loop {
        let trimmed = ty.trim();
        let inner = ["Nullable(", "LowCardinality("].iter().find_map(|prefix| {
            trimmed
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(')'))
        });
        match inner {
            Some(inner) => ty = inner,
            None => return trimmed,
        }
    }
}

enum ColumnBuilder {
    Int64(Int64Builder),
    UInt64(UInt64Builder),
    Float64(Float64Builder),
    Boolean(BooleanBuilder),
    Date32(Date32Builder),
    Timestamp(TimestampMillisecondBuilder),
    Utf8(StringBuilder),
}

impl ColumnBuilder {
    fn for_type(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int64 => ColumnBuilder::Int64(Int64Builder::new()),
            DataType::UInt64 => ColumnBuilder::UInt64(UInt64Builder::new()),
            DataType::Float64 => ColumnBuilder::Float64(Float64Builder::new()),
            DataType::Boolean => ColumnBuilder::Boolean(BooleanBuilder::new()),
            DataType::Date32 => ColumnBuilder::Date32(Date32Builder::new()),
            DataType::Timestamp(_, _) => ColumnBuilder::Timestamp(TimestampMillisecondBuilder::new()),
            _ => ColumnBuilder::Utf8(StringBuilder::new()),
        }
    }

    fn append(&mut self, value: &Value) {
        match self {
            ColumnBuilder::Int64(b) => b.append_option(as_i64(value)),
            ColumnBuilder::UInt64(b) => b.append_option(as_u64(value)),
            ColumnBuilder::Float64(b) => b.append_option(as_f64(value)),
            ColumnBuilder::Boolean(b) => b.append_option(as_bool(value)),
            ColumnBuilder::Date32(b) => b.append_option(as_date32(value)),
            ColumnBuilder::Timestamp(b) => b.append_option(as_timestamp_ms(value)),
            ColumnBuilder::Utf8(b) => match value {
                Value::Null => b.append_null(),
                Value::String(s) => b.append_value(s),
                other => b.append_value(other.to_string()),
            },
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::Int64(b) => Arc::new(b.finish()),
            ColumnBuilder::UInt64(b) => Arc::new(b.finish()),
            ColumnBuilder::Float64(b) => Arc::new(b.finish()),
            ColumnBuilder::Boolean(b) => Arc::new(b.finish()),
            ColumnBuilder::Date32(b) => Arc::new(b.finish()),
            ColumnBuilder::Timestamp(b) => Arc::new(b.finish()),
            ColumnBuilder::Utf8(b) => Arc::new(b.finish()),
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_date32(value: &Value) -> Option<i32> {
    let date = NaiveDate::parse_from_str(value.as_str()?, "%Y-%m-%d").ok()?;
    let days = date.signed_duration_since(DateTime::UNIX_EPOCH.date_naive()).num_days();
    i32::try_from(days).ok()
}

fn as_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|t| t.and_utc().timestamp_millis()),
        Value::Number(n) => n.as_i64().map(|secs| secs.saturating_mul(1000)),
        _ => None,
    }
}

/// Column names made unique (`x`, `x_1`, ...).
fn unique_names(columns: &[ColumnSchema]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(columns.len());
    for column in columns {
        let mut name = column.name.clone();
        let mut n = 1;
        while seen.contains(&name) {
            name = format!("{}_{}", column.name, n);
            n += 1;
        }
        seen.push(name);
    }
    seen
}

fn export_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::internal(format!("parquet export failed: {}", e))
}

struct WriterState {
    schema: SchemaRef,
    writer: ArrowWriter<File>,
    builders: Vec<ColumnBuilder>,
    buffered: usize,
}

impl WriterState {
    fn flush(&mut self) -> CoreResult<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let arrays: Vec<ArrayRef> = self.builders.iter_mut().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays).map_err(export_error)?;
        self.writer.write(&batch).map_err(export_error)?;
        self.buffered = 0;
        Ok(())
    }
}

/// Result of a finished export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub row_count: u64,
    pub columns: Vec<ColumnSchema>,
    pub sample_rows: Vec<Map<String, Value>>,
}

/// Streams rows into a Parquet file, keeping the first few as samples.
pub struct ParquetExporter {
    path: PathBuf,
    sample_limit: usize,
    state: Option<WriterState>,
    columns: Vec<ColumnSchema>,
    names: Vec<String>,
    samples: Vec<Map<String, Value>>,
    rows: u64,
}

impl ParquetExporter {
    pub fn new(path: impl Into<PathBuf>, sample_limit: usize) -> Self {
        Self {
            path: path.into(),
            sample_limit,
            state: None,
            columns: Vec::new(),
            names: Vec::new(),
            samples: Vec::new(),
            rows: 0,
        }
    }

    /// Flush buffered rows and write the file footer.
    pub fn finish(mut self) -> CoreResult<ExportSummary> {
        let mut state = self
            .state
            .take()
            .ok_or_else(|| CoreError::query_failed("result set had no header"))?;
        state.flush()?;
        state.writer.close().map_err(export_error)?;
        Ok(ExportSummary {
            row_count: self.rows,
            columns: self.columns,
            sample_rows: self.samples,
        })
    }
}

impl RowSink for ParquetExporter {
    fn begin(&mut self, columns: &[ColumnSchema]) -> CoreResult<()> {
        let names = unique_names(columns);
        let fields: Vec<Field> = columns
            .iter()
            .zip(&names)
            .map(|(c, name)| Field::new(name.as_str(), arrow_type(&c.data_type), true))
            .collect();
        let schema: SchemaRef = Arc::new(Schema::new(fields));
        let builders = schema
            .fields()
            .iter()
            .map(|f| ColumnBuilder::for_type(f.data_type()))
            .collect();

        let file = File::create(&self.path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(export_error)?;

        self.columns = columns.to_vec();
        self.names = names;
        self.state = Some(WriterState {
            schema,
            writer,
            builders,
            buffered: 0,
        });
        Ok(())
    }

    fn push_row(&mut self, row: Vec<Value>) -> CoreResult<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| CoreError::internal("row received before result header"))?;

        for (i, builder) in state.builders.iter_mut().enumerate() {
            builder.append(row.get(i).unwrap_or(&Value::Null));
        }
        state.buffered += 1;
        self.rows += 1;

        if self.samples.len() < self.sample_limit {
            let sample = self
                .names
                .iter()
                .cloned()
                .zip(row.into_iter().chain(std::iter::repeat(Value::Null)))
                .collect();
            self.samples.push(sample);
        }

        if state.buffered >= BATCH_ROWS {
            state.flush()?;
        }
        Ok(())
    }
}
