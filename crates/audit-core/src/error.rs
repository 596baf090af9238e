use thiserror::Error;

/// Errors surfaced at component boundaries that are genuinely exceptional —
/// not to be confused with session-level faults, which travel as
/// [`crate::types::FailureCode`] on a [`crate::types::ProgressRecord`] instead
/// of as `Err` values. See SPEC_FULL.md §7.1.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AuditError>;
