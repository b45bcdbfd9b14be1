//! Session and Turn Types
//!
//! A session is an ordered, append-only sequence of turns. Turns are
//! immutable once appended and are never reordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::tool::ToolCallRecord;

/// Maximum accepted length of a client-supplied session id.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Validate a client-supplied session id.
///
/// Ids are opaque, but they are echoed in URLs and logs, so only
/// `[A-Za-z0-9._-]` is accepted.
pub fn validate_session_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::validation("session_id cannot be empty"));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(CoreError::validation(format!(
            "session_id exceeds {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(CoreError::validation(
            "session_id may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    Ok(())
}

// ============================================================================
// Turn
// ============================================================================

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(TurnRole::User),
            "assistant" => Some(TurnRole::Assistant),
            "tool" => Some(TurnRole::Tool),
            _ => None,
        }
    }
}

/// A tool call the assistant asked for, as stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Turn payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    /// Plain text (user question or final assistant answer).
    Text { text: String },
    /// Assistant decision to call one or more tools.
    ToolRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        calls: Vec<RequestedToolCall>,
    },
    /// Result of one dispatched tool call.
    ToolResult { record: ToolCallRecord },
    /// Stored turn that could not be decoded. Kept in place so history
    /// keeps its length and order.
    Unreadable { error: String },
}

/// One entry in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: TurnContent,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::now(TurnRole::User, TurnContent::Text { text: text.into() })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::now(TurnRole::Assistant, TurnContent::Text { text: text.into() })
    }

    pub fn tool_request(text: Option<String>, calls: Vec<RequestedToolCall>) -> Self {
        Self::now(TurnRole::Assistant, TurnContent::ToolRequest { text, calls })
    }

    pub fn tool_result(record: ToolCallRecord) -> Self {
        Self::now(TurnRole::Tool, TurnContent::ToolResult { record })
    }

    fn now(role: TurnRole, content: TurnContent) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Text of a user question or final answer.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text { text } => Some(text),
            TurnContent::ToolRequest { text, .. } => text.as_deref(),
            TurnContent::ToolResult { .. } | TurnContent::Unreadable { .. } => None,
        }
    }

    /// True for a turn carrying the user's question.
    pub fn is_user_question(&self) -> bool {
        self.role == TurnRole::User
    }
}

// ============================================================================
// SessionInfo
// ============================================================================

/// Session metadata without its turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub turn_count: usize,
}

impl SessionInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            closed_at: None,
            turn_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("3f6c1e1a-7d2b-4a57-9c44-0d9b2f3e8a10").is_ok());
        assert!(validate_session_id("team.alpha_01").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("has space").is_err());
        assert!(validate_session_id(&"a".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_turn_constructors() {
        let q = Turn::user("Top customers?");
        assert_eq!(q.role, TurnRole::User);
        assert_eq!(q.text(), Some("Top customers?"));
        assert!(q.is_user_question());

        let req = Turn::tool_request(
            None,
            vec![RequestedToolCall {
                id: "c1".into(),
                name: "schema-introspect".into(),
                arguments: json!({}),
            }],
        );
        assert_eq!(req.role, TurnRole::Assistant);
        assert_eq!(req.text(), None);
    }

    #[test]
    fn test_turn_content_serialization_is_tagged() {
        let turn = Turn::assistant("done");
        let value = serde_json::to_value(&turn.content).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "done");

        let back: TurnContent = serde_json::from_value(value).unwrap();
        assert_eq!(back, turn.content);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(TurnRole::parse("tool"), Some(TurnRole::Tool));
        assert_eq!(TurnRole::parse("system"), None);
        assert_eq!(TurnRole::Assistant.as_str(), "assistant");
    }
}
