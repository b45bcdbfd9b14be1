//! ClickHouse HTTP Client
//!
//! Talks to the ClickHouse HTTP interface with reqwest. Results are requested
//! as `JSONCompactEachRowWithNamesAndTypes` and parsed line by line as the
//! body streams in: line one holds column names, line two their types, and
//! every following line is one row.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use serde_json::Value;

use analytics_agent_core::{ColumnSchema, CoreError, CoreResult};

use super::{group_columns, AnalyticsDatabase, CollectRows, RowSink, TableInfo};
use crate::models::settings::ClickHouseSettings;
use crate::utils::error::{AppError, AppResult};

const RESULT_FORMAT: &str = "JSONCompactEachRowWithNamesAndTypes";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_CHARS: usize = 1000;

const LIST_COLUMNS_SQL: &str = "SELECT table, name, type FROM system.columns \
     WHERE database = currentDatabase() ORDER BY table, position";

/// Server error codes that mean the service, not the query, is at fault.
const UNAVAILABLE_CODES: &[u32] = &[
    192, // UNKNOWN_USER
    193, // WRONG_PASSWORD
    194, // REQUIRED_PASSWORD
    202, // TOO_MANY_SIMULTANEOUS_QUERIES
    209, // SOCKET_TIMEOUT
    210, // NETWORK_ERROR
    516, // AUTHENTICATION_FAILED
];

/// ClickHouse over HTTP(S).
pub struct ClickHouseClient {
    http: reqwest::Client,
    url: String,
    user: String,
    password: String,
    database: String,
    host_label: String,
    query_timeout: Duration,
}

impl ClickHouseClient {
    pub fn new(settings: &ClickHouseSettings) -> AppResult<Self> {
        let query_timeout = Duration::from_secs(settings.query_timeout_secs);
        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(query_timeout + CONNECT_TIMEOUT);

        if let Some(path) = &settings.ssl_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                AppError::config(format!("cannot read CA certificate {}: {}", path.display(), e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| AppError::config(format!("invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| AppError::config(format!("failed to build ClickHouse client: {}", e)))?;

        Ok(Self {
            http,
            url: settings.url(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            database: settings.database.clone(),
            host_label: format!("{}:{}/{}", settings.host, settings.port, settings.database),
            query_timeout,
        })
    }

    async fn send(&self, sql: &str) -> CoreResult<reqwest::Response> {
        let timeout = self.query_timeout.as_secs().to_string();
        let response = self
            .http
            .post(&self.url)
            .query(&[
                ("database", self.database.as_str()),
                ("default_format", RESULT_FORMAT),
                ("max_execution_time", timeout.as_str()),
                ("readonly", "2"),
                ("output_format_json_quote_64bit_integers", "1"),
            ])
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_server_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl AnalyticsDatabase for ClickHouseClient {
    async fn list_tables(&self) -> CoreResult<Vec<TableInfo>> {
        let mut rows = CollectRows::default();
        self.stream_query(LIST_COLUMNS_SQL, &mut rows).await?;
        Ok(group_columns(rows.rows.into_iter().filter_map(|row| {
            match row.as_slice() {
                [Value::String(t), Value::String(c), Value::String(ty)] => {
                    Some((t.clone(), c.clone(), ty.clone()))
                }
                _ => None,
            }
        })))
    }

    async fn stream_query(&self, sql: &str, sink: &mut dyn RowSink) -> CoreResult<u64> {
        let response = self.send(sql).await?;
        let mut parser = ResultParser::default();
        let mut body = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| transport_error(&e))?;
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                parser.feed(&line[..line.len() - 1], sink)?;
            }
        }
        if !pending.is_empty() {
            parser.feed(&pending, sink)?;
        }
        parser.finish(sink)
    }

    async fn ping(&self) -> CoreResult<()> {
        let response = self
            .http
            .get(format!("{}ping", self.url))
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CoreError::database_unavailable(format!(
                "ping returned HTTP {}",
                response.status()
            )))
        }
    }

    fn describe(&self) -> String {
        self.host_label.clone()
    }
}

/// Incremental parser for the names-and-types row format.
#[derive(Default)]
struct ResultParser {
    names: Option<Vec<String>>,
    started: bool,
    rows: u64,
}

impl ResultParser {
    fn feed(&mut self, line: &[u8], sink: &mut dyn RowSink) -> CoreResult<()> {
        let line = trim_ascii(line);
        if line.is_empty() {
            return Ok(());
        }
        let values: Vec<Value> = match serde_json::from_slice::<Value>(line) {
            Ok(Value::Array(values)) => values,
            _ => {
                // Errors raised after the response started arrive in the body.
                let text = String::from_utf8_lossy(line);
                return Err(CoreError::query_failed(clip(&text)));
            }
        };

        if self.names.is_none() {
            self.names = Some(values.iter().map(value_to_label).collect());
            return Ok(());
        }
        if !self.started {
            let names = self.names.take().unwrap_or_default();
            if names.len() != values.len() {
                return Err(CoreError::query_failed("malformed result header"));
            }
            let columns: Vec<ColumnSchema> = names
                .into_iter()
                .zip(values.iter())
                .map(|(name, ty)| ColumnSchema::new(name, value_to_label(ty)))
                .collect();
            sink.begin(&columns)?;
            self.names = Some(Vec::new());
            self.started = true;
            return Ok(());
        }

        sink.push_row(values)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(self, sink: &mut dyn RowSink) -> CoreResult<u64> {
        if !self.started {
            // Statements without a result set (e.g. an empty SHOW) still need a header.
            sink.begin(&[])?;
        }
        Ok(self.rows)
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |e| e + 1);
    &bytes[start..end]
}

fn value_to_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clip(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

fn error_code(body: &str) -> Option<u32> {
    static CODE: OnceLock<Option<Regex>> = OnceLock::new();
    CODE.get_or_init(|| Regex::new(r"Code:\s*(\d+)").ok())
        .as_ref()?
        .captures(body)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Map a non-2xx response to the error taxonomy.
fn classify_server_error(status: u16, body: &str) -> CoreError {
    match error_code(body) {
        Some(code) if UNAVAILABLE_CODES.contains(&code) => {
            CoreError::database_unavailable(clip(body))
        }
        Some(_) => CoreError::query_failed(clip(body)),
        None if status == 401 || status == 403 || status >= 500 => {
            CoreError::database_unavailable(format!("HTTP {}: {}", status, clip(body)))
        }
        None => CoreError::query_failed(format!("HTTP {}: {}", status, clip(body))),
    }
}

fn transport_error(err: &reqwest::Error) -> CoreError {
    if err.is_timeout() {
        CoreError::query_failed(format!("query timed out: {}", err))
    } else {
        CoreError::database_unavailable(err.to_string())
    }
}
