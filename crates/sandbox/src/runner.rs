//! Sandboxed Python Runner
//!
//! Each run gets a fresh scratch directory and a fresh interpreter process
//! with an empty environment. The harness applies resource limits and an
//! audit hook before the analysis program starts; this side enforces the
//! wall-clock budget and cancellation by killing the process.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use image::{GenericImageView, ImageFormat};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use analytics_agent_core::{ChartArtifact, ChartFormat, CoreError, CoreResult};

use crate::models::{HarnessReport, SandboxLimits, SandboxOutput, SandboxRequest, ALLOWED_MODULES};

const HARNESS_SOURCE: &str = include_str!("harness.py");
const HARNESS_FILE: &str = "harness.py";
const MPL_CONFIG_DIR: &str = "mplconfig";
/// Raw pipe bytes kept per stream; the rest is drained and dropped.
const PIPE_CAPTURE_BYTES: usize = 8 * 1024 * 1024;
const STDERR_TAIL_CHARS: usize = 1500;

/// Executes analysis code over a materialized artifact.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    /// Run `request`. A program that raises yields `Ok` with `error` set;
    /// timeouts, crashes and limit breaches are `CoreError::Sandbox`, and a
    /// fired `cancel` is `CoreError::Cancelled`.
    async fn execute(
        &self,
        request: SandboxRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<SandboxOutput>;
}

/// Runs analysis code in a child `python -I` process.
pub struct PythonSandbox {
    interpreter: PathBuf,
    scratch_root: PathBuf,
    limits: SandboxLimits,
}

enum Exit {
    Finished(ExitStatus),
    TimedOut,
    Cancelled,
}

impl PythonSandbox {
    /// `scratch_root` holds one directory per run plus the shared
    /// matplotlib cache.
    pub fn new(
        interpreter: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
        limits: SandboxLimits,
    ) -> CoreResult<Self> {
        let scratch_root = scratch_root.into();
        std::fs::create_dir_all(scratch_root.join(MPL_CONFIG_DIR))?;
        Ok(Self {
            interpreter: interpreter.into(),
            scratch_root,
            limits,
        })
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    async fn run_in(
        &self,
        scratch: &Path,
        request: &SandboxRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<SandboxOutput> {
        let started = Instant::now();
        let harness_path = scratch.join(HARNESS_FILE);
        tokio::fs::write(&harness_path, HARNESS_SOURCE).await?;

        let mpl_config = self.scratch_root.join(MPL_CONFIG_DIR);
        let nonce = format!("@@report-{}@@", uuid::Uuid::new_v4().simple());
        let payload = json!({
            "nonce": nonce,
            "code": request.code,
            "artifact_path": request.artifact_path,
            "scratch_dir": scratch,
            "extra_read_roots": [mpl_config],
            "allowed_modules": ALLOWED_MODULES,
            "memory_bytes": self.limits.memory_bytes,
            "cpu_seconds": self.limits.cpu_seconds,
            "file_size_bytes": self.limits.file_size_bytes,
            "max_output_chars": self.limits.max_output_chars,
            "max_figures": self.limits.max_figures,
        });

        let mut child = Command::new(&self.interpreter)
            .arg("-I")
            .arg("-B")
            .arg(&harness_path)
            .current_dir(scratch)
            .env_clear()
            .env("HOME", scratch)
            .env("MPLBACKEND", "Agg")
            .env("MPLCONFIGDIR", &mpl_config)
            .env("OPENBLAS_NUM_THREADS", "1")
            .env("OMP_NUM_THREADS", "1")
            .env("MKL_NUM_THREADS", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .env("LANG", "C.UTF-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CoreError::sandbox(format!(
                    "failed to start interpreter {}: {}",
                    self.interpreter.display(),
                    e
                ))
            })?;

        let stdout_task = child.stdout.take().map(|out| tokio::spawn(read_capped(out)));
        let stderr_task = child.stderr.take().map(|err| tokio::spawn(read_capped(err)));

        if let Some(mut stdin) = child.stdin.take() {
            let bytes = serde_json::to_vec(&payload)?;
            // A harness that dies early closes the pipe; the exit status tells the story.
            if let Err(e) = stdin.write_all(&bytes).await {
                tracing::debug!(error = %e, "sandbox stdin closed early");
            }
            drop(stdin);
        }

        let exit = tokio::select! {
            status = child.wait() => Exit::Finished(status?),
            _ = tokio::time::sleep(self.limits.wall_clock) => {
                let _ = tokio::time::timeout(self.limits.kill_grace, child.kill()).await;
                Exit::TimedOut
            }
            _ = cancel.cancelled() => {
                let _ = tokio::time::timeout(self.limits.kill_grace, child.kill()).await;
                Exit::Cancelled
            }
        };

        let status = match exit {
            Exit::Finished(status) => status,
            Exit::TimedOut | Exit::Cancelled => {
                // Anything the process spawned may still hold the pipes open.
                stdout_task.iter().chain(stderr_task.iter()).for_each(|t| t.abort());
                return Err(match exit {
                    Exit::Cancelled => CoreError::cancelled("analysis run cancelled"),
                    _ => CoreError::sandbox(format!(
                        "execution exceeded the {}s time limit and was stopped",
                        self.limits.wall_clock.as_secs()
                    )),
                });
            }
        };

        let grace = self.limits.kill_grace;
        let (stdout, stderr) = tokio::join!(
            join_capture(stdout_task, grace),
            join_capture(stderr_task, grace)
        );
        let duration_ms = started.elapsed().as_millis() as u64;

        let Some(report) = parse_report(&stdout, &nonce) else {
            return Err(CoreError::sandbox(describe_exit(&status, &stderr)));
        };
        if report.setup_failed {
            return Err(CoreError::sandbox(format!(
                "could not load the artifact: {}",
                report.error.unwrap_or_default()
            )));
        }

        let charts = self.load_charts(scratch, &report.figures).await;
        tracing::debug!(
            duration_ms,
            charts = charts.len(),
            ok = report.ok,
            "sandbox run finished"
        );

        Ok(SandboxOutput {
            stdout: report.stdout,
            stdout_truncated: report.stdout_truncated,
            result: report.result,
            charts,
            error: if report.ok {
                None
            } else {
                Some(report.error.unwrap_or_else(|| "analysis code failed".to_string()))
            },
            duration_ms,
        })
    }

    /// Read and validate the figures the harness saved. Anything that is not
    /// a decodable PNG inside the scratch directory is dropped.
    async fn load_charts(&self, scratch: &Path, names: &[String]) -> Vec<ChartArtifact> {
        let mut charts = Vec::new();
        for name in names.iter().take(self.limits.max_figures) {
            if name.contains('/') || name.contains('\\') || name.starts_with('.') {
                tracing::warn!(name = %name, "ignoring figure outside the scratch directory");
                continue;
            }
            let path = scratch.join(name);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.len() <= self.limits.max_chart_bytes => {}
                Ok(meta) => {
                    tracing::warn!(name = %name, bytes = meta.len(), "figure too large, dropped");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "figure missing");
                    continue;
                }
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => match decode_png(bytes) {
                    Some(chart) => charts.push(chart),
                    None => tracing::warn!(name = %name, "figure is not a valid PNG"),
                },
                Err(e) => tracing::warn!(name = %name, error = %e, "failed to read figure"),
            }
        }
        charts
    }
}

#[async_trait]
impl CodeSandbox for PythonSandbox {
    async fn execute(
        &self,
        request: SandboxRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<SandboxOutput> {
        if !request.artifact_path.is_file() {
            return Err(CoreError::sandbox(format!(
                "artifact file {} does not exist",
                request.artifact_path.display()
            )));
        }

        let scratch = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.scratch_root)?;
        let outcome = self.run_in(scratch.path(), &request, cancel).await;

        if let Err(e) = scratch.close() {
            tracing::warn!(error = %e, "failed to remove sandbox scratch directory");
        }
        outcome
    }
}

/// Stand-in used when no interpreter could be found. Every run fails with
/// the stored reason.
pub struct UnavailableSandbox {
    reason: String,
}

impl UnavailableSandbox {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CodeSandbox for UnavailableSandbox {
    async fn execute(
        &self,
        _request: SandboxRequest,
        _cancel: &CancellationToken,
    ) -> CoreResult<SandboxOutput> {
        Err(CoreError::sandbox(self.reason.clone()))
    }
}

/// Read a pipe to the end, keeping at most `PIPE_CAPTURE_BYTES`.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = PIPE_CAPTURE_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    kept
}

async fn join_capture(
    task: Option<tokio::task::JoinHandle<Vec<u8>>>,
    grace: std::time::Duration,
) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match tokio::time::timeout(grace, task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}

/// The last line carrying `nonce` holds the report.
fn parse_report(stdout: &str, nonce: &str) -> Option<HarnessReport> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(nonce))
        .and_then(|json| serde_json::from_str(json).ok())
}

fn decode_png(bytes: Vec<u8>) -> Option<ChartArtifact> {
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png).ok()?;
    let (width, height) = image.dimensions();
    Some(ChartArtifact::new(ChartFormat::Png, width, height, bytes))
}

fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim_end();
    match trimmed.char_indices().rev().nth(STDERR_TAIL_CHARS) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}

/// Explain an exit that produced no report.
fn describe_exit(status: &ExitStatus, stderr: &str) -> String {
    let reason = match exit_signal(status) {
        Some(24) => "CPU time limit exceeded".to_string(),
        Some(25) => "file size limit exceeded".to_string(),
        Some(9) => "process was killed (memory or resource limit)".to_string(),
        Some(11) => "process crashed (segmentation fault)".to_string(),
        Some(sig) => format!("process terminated by signal {}", sig),
        None => match status.code() {
            Some(code) => format!("interpreter exited with status {}", code),
            None => "interpreter exited abnormally".to_string(),
        },
    };
    let tail = stderr_tail(stderr);
    if tail.is_empty() {
        reason
    } else {
        format!("{}\n{}", reason, tail)
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
