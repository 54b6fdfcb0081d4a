//! Error types for repcount

use thiserror::Error;

/// Errors that can occur while configuring, counting, or persisting sessions
#[derive(Debug, Error)]
pub enum RepError {
    #[error("Invalid exercise profile: {0}")]
    InvalidProfile(String),

    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    #[error("No profile configured for tracked exercise: {0}")]
    UntrackedProfile(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Malformed ledger line: {0}")]
    LedgerParse(String),

    #[error("Failed to write ledger: {0}")]
    LedgerWrite(#[source] std::io::Error),

    #[error("Failed to read ledger: {0}")]
    LedgerRead(#[source] std::io::Error),
}
