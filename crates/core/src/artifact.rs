//! Artifact Types
//!
//! `AnalysisArtifact` is a materialized query result kept on disk between
//! tool calls; only its handle travels through the reasoning context.
//! `ChartArtifact` is an image produced by sandboxed analysis code.

use std::path::PathBuf;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// AnalysisArtifact
// ============================================================================

/// Name and database type of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Reference handed to the reasoning model so a later tool call can reuse
/// the data without moving it through the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub handle: String,
    pub expires_at: DateTime<Utc>,
}

/// A query result materialized as a columnar file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    pub handle: String,
    pub session_id: String,
    pub path: PathBuf,
    pub row_count: u64,
    pub columns: Vec<ColumnSchema>,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl AnalysisArtifact {
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn to_ref(&self) -> ArtifactRef {
        ArtifactRef {
            handle: self.handle.clone(),
            expires_at: self.expires_at(),
        }
    }
}

// ============================================================================
// ChartArtifact
// ============================================================================

/// Encoded image format of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartFormat {
    Png,
}

impl ChartFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ChartFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ChartFormat::Png => "png",
        }
    }
}

/// An image produced by analysis code.
#[derive(Clone, PartialEq, Eq)]
pub struct ChartArtifact {
    pub format: ChartFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl ChartArtifact {
    pub fn new(format: ChartFormat, width: u32, height: u32, bytes: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            bytes,
        }
    }

    /// `data:` URI suitable for direct embedding by clients.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    /// Content-addressed reference stored in history instead of the bytes.
    pub fn content_ref(&self) -> String {
        format!("sha256:{:x}", Sha256::digest(&self.bytes))
    }
}

impl std::fmt::Debug for ChartArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartArtifact")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}
