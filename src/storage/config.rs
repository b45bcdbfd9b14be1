//! Configuration Loading
//!
//! Builds `AppConfig` from defaults, an optional JSON overlay file
//! (`ANALYST_CONFIG_FILE`) and the process environment, in that order.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::settings::AppConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::default_data_dir;

/// Environment variable naming the JSON overlay file.
pub const CONFIG_FILE_VAR: &str = "ANALYST_CONFIG_FILE";

/// Configuration service: resolves and holds the effective config.
#[derive(Debug, Clone)]
pub struct ConfigService {
    config: AppConfig,
    data_dir: PathBuf,
    source_file: Option<PathBuf>,
}

impl ConfigService {
    /// Load from the process environment.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for every variable.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source_file = lookup(CONFIG_FILE_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let mut config = match &source_file {
            Some(path) => Self::load_from_file(path)?,
            None => AppConfig::default(),
        };

        apply_env(&mut config, &lookup)?;
        config.validate().map_err(AppError::config)?;

        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };

        Ok(Self {
            config,
            data_dir,
            source_file,
        })
    }

    /// Wrap an already-built config (tests, embedding).
    pub fn from_config(config: AppConfig, data_dir: impl Into<PathBuf>) -> AppResult<Self> {
        config.validate().map_err(AppError::config)?;
        Ok(Self {
            config,
            data_dir: data_dir.into(),
            source_file: None,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<AppConfig> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&content).map_err(|e| {
            AppError::config(format!("invalid config file {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Get a clone of the current configuration
    pub fn get_config_clone(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }
}

fn apply_env<F>(config: &mut AppConfig, lookup: &F) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("OPENROUTER_API_KEY") {
        config.llm.api_key = Some(v);
    }
    if let Some(v) = get("MODEL") {
        config.llm.model = v;
    }
    set_parsed(&get, "MAX_TOKENS", &mut config.llm.max_tokens)?;
    if let Some(v) = get("LLM_BASE_URL") {
        config.llm.base_url = Some(v);
    }
    set_parsed(&get, "LLM_REQUEST_TIMEOUT_SECONDS", &mut config.llm.request_timeout_secs)?;

    if let Some(v) = get("CLICKHOUSE_HOST") {
        config.clickhouse.host = strip_scheme(&v);
    }
    set_parsed(&get, "CLICKHOUSE_PORT", &mut config.clickhouse.port)?;
    if let Some(v) = get("CLICKHOUSE_USER") {
        config.clickhouse.user = v;
    }
    if let Some(v) = lookup("CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = v;
    }
    if let Some(v) = get("CLICKHOUSE_DATABASE") {
        config.clickhouse.database = v;
    }
    if let Some(v) = get("CLICKHOUSE_SECURE") {
        config.clickhouse.secure = parse_bool("CLICKHOUSE_SECURE", &v)?;
    }
    if let Some(v) = get("CLICKHOUSE_SSL_CERT_PATH") {
        config.clickhouse.ssl_cert_path = Some(PathBuf::from(v));
    }
    set_parsed(&get, "CLICKHOUSE_QUERY_TIMEOUT_SECONDS", &mut config.clickhouse.query_timeout_secs)?;

    if let Some(v) = get("HOST") {
        config.server.host = v;
    }
    set_parsed(&get, "PORT", &mut config.server.port)?;
    if let Some(v) = get("SERVER_URL") {
        config.server.public_url = v;
    }

    set_parsed(&get, "MAX_AGENT_ITERATIONS", &mut config.agent.max_iterations)?;
    set_parsed(&get, "MAX_HISTORY_TURNS", &mut config.agent.max_history_turns)?;
    set_parsed(&get, "REQUEST_DEADLINE_SECONDS", &mut config.agent.request_deadline_secs)?;
    set_parsed(&get, "SESSION_LOCK_WAIT_SECONDS", &mut config.agent.session_lock_wait_secs)?;
    set_parsed(&get, "TEMP_FILE_TTL_SECONDS", &mut config.artifacts.ttl_secs)?;

    if let Some(v) = get("ANALYST_DATA_DIR") {
        config.data_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("SANDBOX_PYTHON") {
        config.sandbox.python = Some(PathBuf::from(v));
    }
    set_parsed(&get, "SANDBOX_TIMEOUT_SECONDS", &mut config.sandbox.timeout_secs)?;
    set_parsed(&get, "SANDBOX_MEMORY_MB", &mut config.sandbox.memory_mb)?;

    Ok(())
}

fn set_parsed<T, G>(get: &G, key: &str, target: &mut T) -> AppResult<()>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *target = raw
            .parse()
            .map_err(|_| AppError::config(format!("{} must be a number, got '{}'", key, raw)))?;
    }
    Ok(())
}

fn parse_bool(key: &str, raw: &str) -> AppResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::config(format!("{} must be a boolean, got '{}'", key, raw))),
    }
}

/// `https://host` and `http://host/` are accepted for the host name.
fn strip_scheme(host: &str) -> String {
    host.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}
