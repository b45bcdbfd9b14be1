//! Interpreter Detection
//!
//! Finds a Python interpreter able to run analysis code. Candidates are
//! probed in order; the first one with the full analysis stack wins, and a
//! bare interpreter is reported only when none has the stack.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Programs probed when no interpreter is configured.
pub const DEFAULT_CANDIDATES: &[&str] = &["python3", "python"];

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const STACK_PROBE: &str = "import sys, importlib.util as u\n\
missing = [m for m in ('pandas', 'numpy', 'matplotlib') if u.find_spec(m) is None]\n\
parquet = u.find_spec('pyarrow') is not None or u.find_spec('fastparquet') is not None\n\
print(sys.executable)\n\
print(sys.version.split()[0])\n\
print('yes' if not missing and parquet else 'no')";

/// A probed interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonInterpreter {
    /// Absolute path reported by the interpreter itself.
    pub path: PathBuf,
    pub version: String,
    /// pandas, numpy, matplotlib and a parquet engine are importable.
    pub has_analysis_stack: bool,
}

/// Probe `candidates` and return the best interpreter found.
pub async fn detect_interpreter<P: AsRef<Path>>(candidates: &[P]) -> Option<PythonInterpreter> {
    let mut fallback = None;
    for candidate in candidates {
        match probe(candidate.as_ref()).await {
            Some(found) if found.has_analysis_stack => {
                tracing::info!(path = %found.path.display(), version = %found.version, "Python interpreter detected");
                return Some(found);
            }
            Some(found) => {
                tracing::warn!(
                    path = %found.path.display(),
                    "Python interpreter lacks pandas/numpy/matplotlib or a parquet engine"
                );
                fallback.get_or_insert(found);
            }
            None => {
                tracing::debug!(candidate = %candidate.as_ref().display(), "not a usable interpreter");
            }
        }
    }
    fallback
}

/// Probe the default candidates.
pub async fn detect_default_interpreter() -> Option<PythonInterpreter> {
    detect_interpreter(DEFAULT_CANDIDATES).await
}

async fn probe(program: &Path) -> Option<PythonInterpreter> {
    let output = Command::new(program)
        .arg("-I")
        .arg("-c")
        .arg(STACK_PROBE)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(PROBE_TIMEOUT, output).await.ok()?.ok()?;
    if !output.status.success() {
        return None;
    }
    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_output(stdout: &str) -> Option<PythonInterpreter> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let path = PathBuf::from(lines.next()?);
    let version = lines.next()?.to_string();
    let has_analysis_stack = lines.next()? == "yes";
    if !path.is_absolute() {
        return None;
    }
    Some(PythonInterpreter {
        path,
        version,
        has_analysis_stack,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let found = parse_probe_output("/usr/bin/python3\n3.11.4\nyes\n").unwrap();
        assert_eq!(found.path, PathBuf::from("/usr/bin/python3"));
        assert_eq!(found.version, "3.11.4");
        assert!(found.has_analysis_stack);

        let bare = parse_probe_output("/usr/bin/python3\n3.12.1\nno").unwrap();
        assert!(!bare.has_analysis_stack);
    }

    #[test]
    fn test_parse_probe_output_rejects_garbage() {
        assert!(parse_probe_output("").is_none());
        assert!(parse_probe_output("python3\n3.11\nyes").is_none());
        assert!(parse_probe_output("/usr/bin/python3\n3.11").is_none());
    }

    #[tokio::test]
    async fn test_missing_candidate_is_skipped() {
        let found = detect_interpreter(&["/nonexistent/bin/python-for-tests"]).await;
        assert!(found.is_none());
    }
}
