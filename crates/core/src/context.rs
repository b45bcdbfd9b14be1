//! Context Hierarchy
//!
//! 1. `ExecutionContext` trait - identity shared by every scope of a run
//! 2. `RunContext` - orchestrator-level context (owns the run deadline)
//! 3. `ToolContext` - what a single tool dispatch sees
//!
//! Tools only receive a `ToolContext`; they can read the session id and the
//! remaining time budget but cannot touch the session history.

use std::time::{Duration, Instant};

// ============================================================================
// ExecutionContext Trait
// ============================================================================

/// Base execution context shared across all scopes of a run.
pub trait ExecutionContext: Send + Sync {
    /// Session this run belongs to.
    fn session_id(&self) -> &str;

    /// Unique identifier of the current run (one analyze request).
    fn run_id(&self) -> &str;

    /// Absolute deadline of the run, if any.
    fn deadline(&self) -> Option<Instant>;

    /// Time left before the deadline. `None` when the run is unbounded.
    fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }
}

// ============================================================================
// RunContext
// ============================================================================

/// Orchestrator-level context for one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    session_id: String,
    run_id: String,
    deadline: Option<Instant>,
}

impl RunContext {
    pub fn new(session_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: run_id.into(),
            deadline: None,
        }
    }

    /// Bound the run by a time budget starting now.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.deadline = Instant::now().checked_add(budget);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Derive the context for one tool call.
    pub fn create_tool_context(&self, tool_call_id: impl Into<String>) -> ToolContext {
        ToolContext {
            session_id: self.session_id.clone(),
            run_id: self.run_id.clone(),
            tool_call_id: tool_call_id.into(),
            deadline: self.deadline,
        }
    }
}

impl ExecutionContext for RunContext {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

// ============================================================================
// ToolContext
// ============================================================================

/// Context for a single tool dispatch.
#[derive(Debug, Clone)]
pub struct ToolContext {
    session_id: String,
    run_id: String,
    tool_call_id: String,
    deadline: Option<Instant>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: String::new(),
            tool_call_id: tool_call_id.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns the unique tool call identifier.
    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    /// The smaller of `limit` and the time left in the run.
    pub fn bounded(&self, limit: Duration) -> Duration {
        match self.remaining() {
            Some(left) => left.min(limit),
            None => limit,
        }
    }
}

impl ExecutionContext for ToolContext {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_context_inherits_run_identity() {
        let run = RunContext::new("sess-1", "run-1").with_budget(Duration::from_secs(60));
        let tool = run.create_tool_context("tc-001");
        assert_eq!(tool.session_id(), "sess-1");
        assert_eq!(tool.run_id(), "run-1");
        assert_eq!(tool.tool_call_id(), "tc-001");
        assert_eq!(tool.deadline(), run.deadline());
    }

    #[test]
    fn test_unbounded_context() {
        let ctx = ToolContext::new("s", "c");
        assert!(ctx.remaining().is_none());
        assert!(!ctx.is_expired());
        assert_eq!(ctx.bounded(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn test_bounded_uses_remaining_time() {
        let ctx = ToolContext::new("s", "c").with_deadline(Instant::now() + Duration::from_secs(2));
        assert!(ctx.bounded(Duration::from_secs(300)) <= Duration::from_secs(2));
        assert!(ctx.bounded(Duration::from_millis(10)) <= Duration::from_millis(10));
    }

    #[test]
    fn test_expired_deadline() {
        let ctx = ToolContext::new("s", "c").with_deadline(Instant::now());
        assert!(ctx.is_expired());
        assert_eq!(ctx.bounded(Duration::from_secs(1)), Duration::ZERO);
    }
}
