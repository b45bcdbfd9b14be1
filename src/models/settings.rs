//! Settings Models
//!
//! Service configuration. Every section has defaults so a partial JSON
//! overlay file and a sparse environment both produce a complete config.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use analytics_agent_core::{CoreResult, RunLimits, RunLimitsBuilder};
use analytics_agent_llm::{ProviderConfig, ProviderType};
use analytics_agent_sandbox::SandboxLimits;

/// Reasoning model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    /// Override for the OpenRouter endpoint (any OpenAI-compatible API).
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "anthropic/claude-sonnet-4-6".to_string(),
            max_tokens: 8192,
            base_url: None,
            request_timeout_secs: 120,
            temperature: 0.0,
        }
    }
}

/// ClickHouse connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub database: String,
    /// HTTPS when true.
    pub secure: bool,
    /// Extra CA certificate (PEM) for the server.
    pub ssl_cert_path: Option<PathBuf>,
    pub query_timeout_secs: u64,
}

impl Default for ClickHouseSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8443,
            user: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
            secure: true,
            ssl_cert_path: None,
            query_timeout_secs: 300,
        }
    }
}

impl ClickHouseSettings {
    /// Base URL of the HTTP interface.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Externally visible URL, reported by `/api/info`.
    pub public_url: String,
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_url: "http://localhost:8000".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Orchestration limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: u32,
    pub max_history_turns: usize,
    pub max_context_chars: usize,
    pub request_deadline_secs: u64,
    pub session_lock_wait_secs: u64,
    /// LIMIT appended to unbounded SELECTs.
    pub row_limit: u64,
    /// Rows of each query result shown to the model.
    pub sample_rows: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_history_turns: 10,
            max_context_chars: 120_000,
            request_deadline_secs: 300,
            session_lock_wait_secs: 30,
            row_limit: 50_000,
            sample_rows: 5,
        }
    }
}

/// Longest accepted artifact retention (one year).
pub const MAX_ARTIFACT_TTL_SECS: u64 = 365 * 24 * 3600;

/// Query artifact retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            sweep_interval_secs: 1800,
        }
    }
}

/// Sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Interpreter to use; probed from PATH when unset.
    pub python: Option<PathBuf>,
    pub timeout_secs: u64,
    pub memory_mb: u64,
    pub cpu_seconds: u64,
    pub max_output_chars: usize,
    pub max_figures: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        let limits = SandboxLimits::default();
        Self {
            python: None,
            timeout_secs: limits.wall_clock.as_secs(),
            memory_mb: limits.memory_bytes / (1024 * 1024),
            cpu_seconds: limits.cpu_seconds,
            max_output_chars: limits.max_output_chars,
            max_figures: limits.max_figures,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub clickhouse: ClickHouseSettings,
    pub server: ServerSettings,
    pub agent: AgentSettings,
    pub artifacts: ArtifactSettings,
    pub sandbox: SandboxSettings,
    /// Root for the history database, artifacts and sandbox scratch space.
    /// Resolved to `~/.analytics-agent` when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            clickhouse: ClickHouseSettings::default(),
            server: ServerSettings::default(),
            agent: AgentSettings::default(),
            artifacts: ArtifactSettings::default(),
            sandbox: SandboxSettings::default(),
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.llm.model.trim().is_empty() {
            return Err("llm.model cannot be empty".to_string());
        }
        if self.llm.max_tokens == 0 {
            return Err("llm.max_tokens must be positive".to_string());
        }
        if self.llm.request_timeout_secs == 0 {
            return Err("llm.request_timeout_secs must be positive".to_string());
        }
        if self.clickhouse.host.contains('/') {
            return Err(format!(
                "clickhouse.host must be a bare host name, got '{}'",
                self.clickhouse.host
            ));
        }
        if self.clickhouse.query_timeout_secs == 0 {
            return Err("clickhouse.query_timeout_secs must be positive".to_string());
        }
        if self.agent.row_limit == 0 {
            return Err("agent.row_limit must be positive".to_string());
        }
        if self.artifacts.ttl_secs == 0 || self.artifacts.sweep_interval_secs == 0 {
            return Err("artifact ttl and sweep interval must be positive".to_string());
        }
        if self.artifacts.ttl_secs > MAX_ARTIFACT_TTL_SECS {
            return Err(format!(
                "artifacts.ttl_secs must be at most {} (got {})",
                MAX_ARTIFACT_TTL_SECS, self.artifacts.ttl_secs
            ));
        }
        if self.sandbox.timeout_secs == 0 || self.sandbox.memory_mb == 0 {
            return Err("sandbox timeout and memory must be positive".to_string());
        }
        self.run_limits().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Checks that only matter when the service actually starts.
    pub fn validate_for_startup(&self) -> Result<(), String> {
        self.validate()?;
        if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err("OPENROUTER_API_KEY is not set".to_string());
        }
        if self.clickhouse.host.trim().is_empty() {
            return Err("CLICKHOUSE_HOST is not set".to_string());
        }
        Ok(())
    }

    pub fn run_limits(&self) -> CoreResult<RunLimits> {
        RunLimitsBuilder::new()
            .max_iterations(self.agent.max_iterations)
            .max_history_turns(self.agent.max_history_turns)
            .max_context_chars(self.agent.max_context_chars)
            .deadline(Duration::from_secs(self.agent.request_deadline_secs))
            .session_lock_wait(Duration::from_secs(self.agent.session_lock_wait_secs))
            .build()
    }

    pub fn sandbox_limits(&self) -> SandboxLimits {
        SandboxLimits {
            wall_clock: Duration::from_secs(self.sandbox.timeout_secs),
            memory_bytes: self.sandbox.memory_mb.saturating_mul(1024 * 1024),
            cpu_seconds: self.sandbox.cpu_seconds,
            max_output_chars: self.sandbox.max_output_chars,
            max_figures: self.sandbox.max_figures,
            ..SandboxLimits::default()
        }
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: ProviderType::OpenRouter,
            api_key: self.llm.api_key.clone(),
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            temperature: self.llm.temperature,
            request_timeout_secs: self.llm.request_timeout_secs,
            referer: Some(self.server.public_url.clone()),
            ..ProviderConfig::default()
        }
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifacts.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.artifacts.sweep_interval_secs)
    }
}
