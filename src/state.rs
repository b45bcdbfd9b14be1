//! Application State
//!
//! Every long-lived service, wired once at startup and shared by all
//! request handlers.

use std::sync::Arc;

use analytics_agent_llm::{LlmProvider, OpenAICompatibleProvider, RetryPolicy};
use analytics_agent_sandbox::{
    detect_interpreter, CodeSandbox, PythonSandbox, UnavailableSandbox, DEFAULT_CANDIDATES,
};

use crate::models::response::SandboxInfo;
use crate::models::settings::AppConfig;
use crate::services::analytics_db::{AnalyticsDatabase, ClickHouseClient};
use crate::services::artifacts::ArtifactStore;
use crate::services::orchestrator::{build_system_prompt, OrchestratorConfig, OrchestratorService, ToolDispatcher};
use crate::services::query_executor::QueryExecutor;
use crate::services::schema::SchemaIntrospector;
use crate::services::session_store::{SessionLocks, SessionStore, SqliteSessionStore};
use crate::storage::{ConfigService, Database};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths;

/// External dependencies the state is built from.
pub struct Dependencies {
    pub history: Database,
    pub analytics_db: Arc<dyn AnalyticsDatabase>,
    pub provider: Arc<dyn LlmProvider>,
    pub sandbox: Arc<dyn CodeSandbox>,
    pub sandbox_info: SandboxInfo,
}

/// Shared application state.
pub struct AppState {
    config: ConfigService,
    history: Database,
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    artifacts: Arc<ArtifactStore>,
    analytics_db: Arc<dyn AnalyticsDatabase>,
    orchestrator: Arc<OrchestratorService>,
    sandbox_info: SandboxInfo,
}

impl AppState {
    /// Wire the services around `deps`.
    ///
    /// The schema is fetched once for the system prompt; an unreachable
    /// database only degrades the prompt.
    pub async fn initialize(config: ConfigService, deps: Dependencies) -> AppResult<Self> {
        let settings = config.get_config_clone();
        let data_dir = config.data_dir().to_path_buf();
        let limits = settings.run_limits()?;

        let artifacts = Arc::new(ArtifactStore::new(
            paths::artifacts_dir(&data_dir),
            settings.artifact_ttl(),
        )?);
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(deps.history.clone()));
        let locks = Arc::new(SessionLocks::new(limits.session_lock_wait));

        let schema = Arc::new(SchemaIntrospector::new(deps.analytics_db.clone()));
        let tables = match schema.list_tables(None).await {
            Ok(tables) => {
                tracing::info!(tables = tables.len(), database = %deps.analytics_db.describe(), "schema loaded");
                Some(tables)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not load the database schema at startup");
                None
            }
        };
        let system_prompt = build_system_prompt(tables.as_deref(), settings.agent.row_limit);

        let queries = Arc::new(QueryExecutor::new(
            deps.analytics_db.clone(),
            artifacts.clone(),
            settings.agent.row_limit,
            settings.agent.sample_rows,
        ));
        let dispatcher = ToolDispatcher::new(schema, queries, deps.sandbox, artifacts.clone());
        let orchestrator = Arc::new(OrchestratorService::new(
            OrchestratorConfig {
                system_prompt,
                limits,
                retry: RetryPolicy::default(),
            },
            deps.provider,
            store.clone(),
            locks.clone(),
            dispatcher,
        ));

        Ok(Self {
            config,
            history: deps.history,
            store,
            locks,
            artifacts,
            analytics_db: deps.analytics_db,
            orchestrator,
            sandbox_info: deps.sandbox_info,
        })
    }

    /// Production wiring: SQLite history under the data dir, ClickHouse,
    /// OpenRouter and a subprocess sandbox.
    pub async fn from_config(config: ConfigService) -> AppResult<Self> {
        let settings: AppConfig = config.get_config_clone();
        let data_dir = config.data_dir().to_path_buf();
        paths::ensure_layout(&data_dir)?;

        let history = Database::open(&paths::history_db_path(&data_dir))?;
        let analytics_db: Arc<dyn AnalyticsDatabase> = Arc::new(ClickHouseClient::new(&settings.clickhouse)?);
        let provider: Arc<dyn LlmProvider> = Arc::new(
            OpenAICompatibleProvider::new(settings.provider_config())
                .map_err(|e| AppError::config(e.to_string()))?,
        );
        let (sandbox, sandbox_info) = build_sandbox(&settings, &paths::sandbox_dir(&data_dir)).await?;

        Self::initialize(
            config,
            Dependencies {
                history,
                analytics_db,
                provider,
                sandbox,
                sandbox_info,
            },
        )
        .await
    }

    pub fn config(&self) -> &AppConfig {
        self.config.get_config()
    }

    pub fn config_service(&self) -> &ConfigService {
        &self.config
    }

    pub fn history(&self) -> &Database {
        &self.history
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<SessionLocks> {
        &self.locks
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    pub fn analytics_db(&self) -> &Arc<dyn AnalyticsDatabase> {
        &self.analytics_db
    }

    pub fn orchestrator(&self) -> &Arc<OrchestratorService> {
        &self.orchestrator
    }

    pub fn sandbox_info(&self) -> &SandboxInfo {
        &self.sandbox_info
    }
}

/// Probe for an interpreter and build the sandbox. Without one, analysis
/// calls fail with a sandbox error instead of the service refusing to start.
async fn build_sandbox(
    settings: &AppConfig,
    scratch_root: &std::path::Path,
) -> AppResult<(Arc<dyn CodeSandbox>, SandboxInfo)> {
    let found = match &settings.sandbox.python {
        Some(python) => detect_interpreter(&[python.as_path()]).await,
        None => detect_interpreter(DEFAULT_CANDIDATES).await,
    };

    let Some(interpreter) = found else {
        tracing::warn!("no Python interpreter found; sandbox-execute will be unavailable");
        let info = SandboxInfo {
            interpreter: None,
            version: None,
            analysis_stack: false,
        };
        let sandbox = UnavailableSandbox::new("no Python interpreter is available on this server");
        return Ok((Arc::new(sandbox), info));
    };

    if interpreter.has_analysis_stack {
        tracing::info!(python = %interpreter.path.display(), version = %interpreter.version, "sandbox interpreter found");
    } else {
        tracing::warn!(
            python = %interpreter.path.display(),
            version = %interpreter.version,
            "interpreter lacks pandas/matplotlib; analysis code will fail to import them"
        );
    }

    let info = SandboxInfo {
        interpreter: Some(interpreter.path.display().to_string()),
        version: Some(interpreter.version.clone()),
        analysis_stack: interpreter.has_analysis_stack,
    };
    let sandbox = PythonSandbox::new(interpreter.path, scratch_root, settings.sandbox_limits())?;
    Ok((Arc::new(sandbox), info))
}
