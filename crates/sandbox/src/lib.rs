//! Analytics Agent Sandbox
//!
//! Runs untrusted analysis code in a separate Python process:
//!
//! - `models` - limits, requests and outputs
//! - `detector` - interpreter discovery
//! - `runner` - the `CodeSandbox` trait and the process-backed `PythonSandbox`
//!
//! The embedded harness loads the artifact as a pandas DataFrame, applies
//! rlimits, installs an audit hook that denies network, subprocess and
//! out-of-scratch file access, and restricts imports to `ALLOWED_MODULES`.

pub mod detector;
pub mod models;
pub mod runner;

pub use detector::{detect_default_interpreter, detect_interpreter, PythonInterpreter, DEFAULT_CANDIDATES};
pub use models::{SandboxLimits, SandboxOutput, SandboxRequest, ALLOWED_MODULES};
pub use runner::{CodeSandbox, PythonSandbox, UnavailableSandbox};
