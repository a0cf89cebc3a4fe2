//! Error taxonomy for loop stages and loop construction.
//!
//! Stage errors are local to one attempt or iteration: the loops log them and
//! turn them into corrective feedback. Only [`ConfigError`] is fatal, and only
//! at construction time.

use thiserror::Error;

use crate::core::types::{ExecutionStatus, ValidationKind};

/// A failure confined to one coding attempt or one design iteration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("{}: {message}", kind.as_str())]
    Validation {
        kind: ValidationKind,
        message: String,
    },

    #[error("{}: {message}", status.as_str())]
    Execution {
        status: ExecutionStatus,
        message: String,
    },

    #[error("render failed: {0}")]
    Render(String),

    #[error("visual feedback failed: {0}")]
    Feedback(String),

    #[error("judge failed: {0}")]
    Judge(String),
}

impl StageError {
    /// Short stage label used in structured log events.
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Generation(_) => "generate",
            StageError::Validation { .. } => "validate",
            StageError::Execution { .. } => "execute",
            StageError::Render(_) => "render",
            StageError::Feedback(_) => "feedback",
            StageError::Judge(_) => "judge",
        }
    }

    /// Text handed back to the generator as feedback for the next attempt.
    pub fn feedback_text(&self) -> String {
        match self {
            StageError::Validation { message, .. } | StageError::Execution { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Fatal misconfiguration detected while building a loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("{0} must be > 0")]
    ZeroIterations(&'static str),

    #[error("{0} must be at least one second")]
    ZeroTimeout(&'static str),

    #[error("stop_threshold must be within [0, 1], got {0}")]
    StopThreshold(String),

    #[error("escalation fraction must satisfy 0 < numerator <= denominator, got {numerator}/{denominator}")]
    EscalationFraction { numerator: usize, denominator: usize },

    #[error("{0} must be a non-empty command")]
    EmptyCommand(&'static str),
}
