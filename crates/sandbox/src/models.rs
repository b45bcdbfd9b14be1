//! Sandbox Models
//!
//! Requests, limits and outputs of one sandboxed analysis run.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use analytics_agent_core::ChartArtifact;

/// Top-level modules analysis code may import.
pub const ALLOWED_MODULES: &[&str] = &[
    "pandas",
    "numpy",
    "matplotlib",
    "seaborn",
    "scipy",
    "tabulate",
    "math",
    "cmath",
    "statistics",
    "datetime",
    "calendar",
    "time",
    "json",
    "re",
    "string",
    "textwrap",
    "collections",
    "itertools",
    "functools",
    "operator",
    "decimal",
    "fractions",
    "numbers",
    "random",
    "typing",
    "dataclasses",
    "warnings",
];

/// Resource limits applied to every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Wall-clock budget measured from process spawn.
    pub wall_clock: Duration,
    /// Address space granted on top of what the preloaded libraries use.
    pub memory_bytes: u64,
    pub cpu_seconds: u64,
    /// Largest file the program may write.
    pub file_size_bytes: u64,
    /// Captured stdout beyond this many characters is dropped.
    pub max_output_chars: usize,
    pub max_figures: usize,
    /// Largest accepted PNG per figure.
    pub max_chart_bytes: u64,
    /// How long to wait for the process to exit after a kill.
    pub kill_grace: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            wall_clock: Duration::from_secs(60),
            memory_bytes: 1024 * 1024 * 1024,
            cpu_seconds: 60,
            file_size_bytes: 64 * 1024 * 1024,
            max_output_chars: 20_000,
            max_figures: 10,
            max_chart_bytes: 10 * 1024 * 1024,
            kill_grace: Duration::from_secs(2),
        }
    }
}

/// One analysis program and the artifact it runs over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRequest {
    pub code: String,
    /// Columnar file loaded as `df`.
    pub artifact_path: PathBuf,
}

impl SandboxRequest {
    pub fn new(code: impl Into<String>, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            code: code.into(),
            artifact_path: artifact_path.into(),
        }
    }
}

/// What a completed run produced.
///
/// `error` is set when the program itself raised; charts drawn before the
/// failure are still returned.
#[derive(Debug, Clone, Default)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stdout_truncated: bool,
    pub result: Option<String>,
    pub charts: Vec<ChartArtifact>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl SandboxOutput {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Report line written by the harness.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct HarnessReport {
    pub ok: bool,
    #[serde(default)]
    pub setup_failed: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stdout_truncated: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub figures: Vec<String>,
}
