//! Error taxonomy shared by the rollout controller and the storage backend.
//!
//! [`RecallError`] covers the failures that reach a caller. Graph expansion has its
//! own [`ExpansionFault`] type on purpose: it is never converted into a
//! `RecallError`, the orchestrator turns it into a fallback instead.

use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = RecallError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RecallError {
    /// Malformed request input. Raised before any storage call.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    /// Unknown entity with no synthesizable default.
    #[error("{0}")]
    NotFound(String),

    /// Collaborator failure reading or writing state. Retryable.
    #[error("storage error: {0}")]
    Storage(String),
}

impl RecallError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    /// Error type string used in the `{type, code, message}` envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound(_) => "not_found_error",
            Self::Storage(_) => "storage_error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. } => code,
            Self::NotFound(_) => "NOT_FOUND",
            Self::Storage(_) => "STORAGE_FAILURE",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error_type: self.kind(),
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Serialized error body returned to tool callers.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl From<rusqlite::Error> for RecallError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RecallError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization failed: {err}"))
    }
}

/// Failure inside the graph-expansion path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionFault {
    #[error("graph expansion exceeded its time budget")]
    Timeout,
    #[error("graph expansion was cancelled")]
    Cancelled,
    #[error("graph expansion storage failure: {0}")]
    Storage(String),
}

impl ExpansionFault {
    /// Value written to `fallbackReason` in the trace and the rollout event.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout => "graph_expansion_timeout",
            Self::Cancelled => "graph_expansion_cancelled",
            Self::Storage(_) => "graph_expansion_error",
        }
    }

    /// Whether this fault counts toward the graph error rate (as opposed to
    /// time budget or cancellation).
    pub fn is_graph_error(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<rusqlite::Error> for ExpansionFault {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
