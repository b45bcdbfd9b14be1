//! Run Limits Builder
//!
//! Bounds applied to every orchestrator run. Validation happens at build
//! time so a bad limit is caught at startup rather than mid-run.
//!
//! ```ignore
//! let limits = RunLimitsBuilder::new()
//!     .max_iterations(15)
//!     .max_history_turns(10)
//!     .build()?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Upper bound accepted for `max_iterations`.
pub const MAX_ITERATIONS_CEILING: u32 = 50;

/// Validated run limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Reasoning/tool iterations per run.
    pub max_iterations: u32,
    /// User turns of prior history replayed into the context.
    pub max_history_turns: usize,
    /// Character budget for replayed history.
    pub max_context_chars: usize,
    /// Overall deadline of one run.
    pub deadline: Duration,
    /// How long a request waits for a session held by another run.
    pub session_lock_wait: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_history_turns: 10,
            max_context_chars: 120_000,
            deadline: Duration::from_secs(300),
            session_lock_wait: Duration::from_secs(30),
        }
    }
}

/// Builder for `RunLimits`. Unset fields take the defaults.
#[derive(Debug, Default)]
pub struct RunLimitsBuilder {
    max_iterations: Option<u32>,
    max_history_turns: Option<usize>,
    max_context_chars: Option<usize>,
    deadline: Option<Duration>,
    session_lock_wait: Option<Duration>,
}

impl RunLimitsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn max_history_turns(mut self, n: usize) -> Self {
        self.max_history_turns = Some(n);
        self
    }

    pub fn max_context_chars(mut self, n: usize) -> Self {
        self.max_context_chars = Some(n);
        self
    }

    pub fn deadline(mut self, d: Duration) -> Self {
        self.deadline = Some(d);
        self
    }

    pub fn session_lock_wait(mut self, d: Duration) -> Self {
        self.session_lock_wait = Some(d);
        self
    }

    /// Build and validate the limits.
    pub fn build(self) -> CoreResult<RunLimits> {
        let defaults = RunLimits::default();
        let limits = RunLimits {
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            max_history_turns: self.max_history_turns.unwrap_or(defaults.max_history_turns),
            max_context_chars: self.max_context_chars.unwrap_or(defaults.max_context_chars),
            deadline: self.deadline.unwrap_or(defaults.deadline),
            session_lock_wait: self.session_lock_wait.unwrap_or(defaults.session_lock_wait),
        };

        if limits.max_iterations == 0 || limits.max_iterations > MAX_ITERATIONS_CEILING {
            return Err(CoreError::validation(format!(
                "max_iterations must be between 1 and {}",
                MAX_ITERATIONS_CEILING
            )));
        }
        if limits.max_history_turns == 0 {
            return Err(CoreError::validation("max_history_turns must be > 0"));
        }
        if limits.max_context_chars < 1_000 {
            return Err(CoreError::validation("max_context_chars must be at least 1000"));
        }
        if limits.deadline.is_zero() {
            return Err(CoreError::validation("deadline must be > 0"));
        }

        Ok(limits)
    }
}
