//! Rule evaluation errors

use thiserror::Error;

/// Errors raised by the rule engine's collaborators
///
/// Malformed expressions never surface here; they degrade to a non-match or
/// to the expression as typed. These variants are collaborator failures that
/// make the current rule be skipped.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("calculation of '{expression}' failed: {message}")]
    Calculation { expression: String, message: String },

    #[error("script '{name}' failed: {message}")]
    Script { name: String, message: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for rule evaluation
pub type RuleResult<T> = Result<T, RuleError>;
