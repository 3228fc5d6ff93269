//! Node error taxonomy.
//!
//! Synchronous operations return a `NodeError` to their caller. Failures that happen in
//! background tasks are published on the node's error channel instead.

use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Dial failures, non-success statuses, operations attempted while disconnected, unknown
    /// recipients.
    #[error("connection error: {0}")]
    Connection(String),
    /// Malformed wire payloads and messages that cannot be encoded.
    #[error("parsing error: {0}")]
    Parsing(String),
    /// Transport startup/shutdown failures and broken internal channels.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NodeError {
    pub fn connection(context: &str, source: impl Display) -> Self {
        NodeError::Connection(format!("{}: {}", context, source))
    }

    pub fn parsing(context: &str, source: impl Display) -> Self {
        NodeError::Parsing(format!("{}: {}", context, source))
    }

    pub fn internal(context: &str, source: impl Display) -> Self {
        NodeError::Internal(format!("{}: {}", context, source))
    }

    pub fn not_connected() -> Self {
        NodeError::Connection("node not connected".to_string())
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, NodeError::Connection(_))
    }

    pub fn is_parsing(&self) -> bool {
        matches!(self, NodeError::Parsing(_))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, NodeError::Internal(_))
    }
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;
