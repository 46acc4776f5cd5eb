//! Error taxonomy.
//!
//! Only [`ConverseError`] ends a `converse` call. [`ToolError`]s are caught
//! per call and handed back to the engine as failure results.

use crate::types::ConversationTurn;
use thiserror::Error;

/// Fatal outcome of a `converse` call.
#[derive(Debug, Error)]
pub enum ConverseError {
    #[error("request must not be empty")]
    EmptyRequest,

    #[error("reasoning engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Carries the partial turn for diagnostics.
    #[error("no final answer after {limit} tool rounds")]
    LoopLimitExceeded { limit: u32, turn: ConversationTurn },

    #[error("malformed tool call: {0}")]
    MalformedToolCall(String),

    #[error("conversation cancelled after {rounds} rounds")]
    Cancelled { rounds: u32 },
}

/// Failure reported by a reasoning engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Malformed(String),
}

impl From<EngineError> for ConverseError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Unavailable(msg) => ConverseError::EngineUnavailable(msg),
            EngineError::Malformed(msg) => ConverseError::MalformedToolCall(msg),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(value: reqwest::Error) -> Self {
        EngineError::Unavailable(value.to_string())
    }
}

/// Per-call tool fault. Its display text is what the engine sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("tool timed out after {0} ms")]
    TimedOut(u64),

    #[error("tool panicked: {0}")]
    Panicked(String),
}

/// Problems building a [`crate::tools::ToolRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool '{0}' registered more than once")]
    DuplicateTool(String),

    #[error("tool name must not be empty")]
    EmptyName,
}
