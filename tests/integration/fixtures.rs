//! Test fixtures shared by the integration suites.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use analytics_agent::models::settings::AppConfig;
use analytics_agent::services::analytics_db::{AnalyticsDatabase, RowSink, TableInfo};
use analytics_agent::storage::{ConfigService, Database};
use analytics_agent::{AppState, Dependencies, SandboxInfo};
use analytics_agent_core::{ChartArtifact, ChartFormat, ColumnSchema, CoreError, CoreResult};
use analytics_agent_llm::{LlmResponse, LlmResult, Message, MessageContent, ScriptedProvider, ToolCall};
use analytics_agent_sandbox::{CodeSandbox, SandboxOutput, SandboxRequest};

// ============================================================================
// Fixture database
// ============================================================================

/// In-memory `campaigns` table. Every statement that reaches it is recorded.
pub struct FixtureDatabase {
    rows: Vec<(String, String, f64)>,
    executed: Mutex<Vec<String>>,
}

impl FixtureDatabase {
    pub fn new() -> Self {
        Self {
            rows: vec![
                ("spring".into(), "2024-03-04".into(), 0.12),
                ("summer".into(), "2024-06-10".into(), 0.08),
                ("autumn".into(), "2024-09-16".into(), 0.05),
            ],
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn columns() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("campaign", "String"),
            ColumnSchema::new("week", "Date"),
            ColumnSchema::new("ctr", "Float64"),
        ]
    }
}

#[async_trait]
impl AnalyticsDatabase for FixtureDatabase {
    async fn list_tables(&self) -> CoreResult<Vec<TableInfo>> {
        Ok(vec![TableInfo {
            name: "campaigns".into(),
            columns: Self::columns(),
        }])
    }

    async fn stream_query(&self, sql: &str, sink: &mut dyn RowSink) -> CoreResult<u64> {
        self.executed.lock().unwrap().push(sql.to_string());
        sink.begin(&Self::columns())?;
        for (campaign, week, ctr) in &self.rows {
            sink.push_row(vec![json!(campaign), json!(week), json!(ctr)])?;
        }
        Ok(self.rows.len() as u64)
    }

    async fn ping(&self) -> CoreResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "fixture:8443/default".into()
    }
}

// ============================================================================
// Stub sandbox
// ============================================================================

/// Draws a real PNG for ordinary programs. Programs that loop forever or
/// allocate without bound fail the way the subprocess sandbox reports
/// limit breaches; `time.sleep` programs take 300 ms.
pub struct StubSandbox {
    pub runs: AtomicUsize,
}

impl StubSandbox {
    pub fn new() -> Self {
        Self {
            runs: AtomicUsize::new(0),
        }
    }
}

pub fn png_chart(width: u32, height: u32) -> ChartArtifact {
    let image = image::RgbImage::from_fn(width, height, |x, _| image::Rgb([(x * 20) as u8, 90, 160]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    ChartArtifact::new(ChartFormat::Png, width, height, bytes)
}

#[async_trait]
impl CodeSandbox for StubSandbox {
    async fn execute(&self, request: SandboxRequest, cancel: &CancellationToken) -> CoreResult<SandboxOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !request.artifact_path.is_file() {
            return Err(CoreError::sandbox("artifact file is missing"));
        }
        if request.code.contains("while True") {
            tokio::select! {
                _ = cancel.cancelled() => return Err(CoreError::cancelled("sandbox run cancelled")),
                _ = tokio::time::sleep(Duration::from_millis(20)) => {}
            }
            return Err(CoreError::sandbox("execution exceeded the 60 s wall-clock limit and was killed"));
        }
        if request.code.contains("time.sleep") {
            tokio::select! {
                _ = cancel.cancelled() => return Err(CoreError::cancelled("sandbox run cancelled")),
                _ = tokio::time::sleep(Duration::from_millis(300)) => {}
            }
        }
        if request.code.contains("10**12") {
            return Err(CoreError::sandbox("process exceeded its memory limit (MemoryError)"));
        }
        Ok(SandboxOutput {
            stdout: String::new(),
            stdout_truncated: false,
            result: Some("| campaign | ctr |\n|---|---|\n| spring | 0.12 |".into()),
            charts: vec![png_chart(8, 6)],
            error: None,
            duration_ms: 5,
        })
    }
}

// ============================================================================
// Application
// ============================================================================

pub struct TestApp {
    pub state: Arc<AppState>,
    pub db: Arc<FixtureDatabase>,
    pub provider: Arc<ScriptedProvider>,
    pub sandbox: Arc<StubSandbox>,
    _data_dir: TempDir,
}

/// Build the application around `provider`. `tweak` adjusts the default
/// configuration first.
pub async fn test_app_with<F>(provider: ScriptedProvider, tweak: F) -> TestApp
where
    F: FnOnce(&mut AppConfig),
{
    let data_dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.agent.session_lock_wait_secs = 5;
    tweak(&mut config);

    let db = Arc::new(FixtureDatabase::new());
    let provider = Arc::new(provider);
    let sandbox = Arc::new(StubSandbox::new());

    let state = AppState::initialize(
        ConfigService::from_config(config, data_dir.path()).unwrap(),
        Dependencies {
            history: Database::new_in_memory().unwrap(),
            analytics_db: db.clone(),
            provider: provider.clone(),
            sandbox: sandbox.clone(),
            sandbox_info: SandboxInfo {
                interpreter: Some("stub".into()),
                version: Some("3.11.0".into()),
                analysis_stack: true,
            },
        },
    )
    .await
    .unwrap();

    TestApp {
        state: Arc::new(state),
        db,
        provider,
        sandbox,
        _data_dir: data_dir,
    }
}

pub async fn test_app(provider: ScriptedProvider) -> TestApp {
    test_app_with(provider, |_| {}).await
}

// ============================================================================
// Scripted model helpers
// ============================================================================

/// Parsed content of every tool result the model has seen, newest first.
pub fn tool_results(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .rev()
        .flat_map(|m| m.content.iter().rev())
        .filter_map(|c| match c {
            MessageContent::ToolResult { content, .. } => serde_json::from_str(content).ok(),
            _ => None,
        })
        .collect()
}

/// Most recent artifact handle visible to the model, replayed history included.
pub fn latest_artifact_handle(messages: &[Message]) -> String {
    tool_results(messages)
        .iter()
        .find_map(|v| v["artifact_handle"].as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Responder that runs `code` over the most recent query artifact.
pub fn sandbox_over_last_artifact(
    id: &'static str,
    code: &'static str,
) -> impl Fn(&[Message]) -> LlmResult<LlmResponse> + Send + Sync + 'static {
    move |messages| {
        Ok(LlmResponse::with_tool_calls(vec![ToolCall::new(
            id,
            "sandbox-execute",
            json!({"code": code, "artifact_handle": latest_artifact_handle(messages)}),
        )]))
    }
}
