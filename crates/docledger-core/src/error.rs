//! Typed errors surfaced at the engine boundary.
//!
//! Every [`LedgerError`] maps to exactly one stable code string returned to
//! collaborators (see [`LedgerError::code`]). Storage backends wrap their own
//! failures in [`LedgerError::Internal`].

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed filters, out-of-range version numbers, bad parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown path, version, document, project, or folder.
    #[error("{what} not found: {hint}")]
    NotFound { what: String, hint: String },

    /// Requested page size or result size is over the server cap.
    #[error("limit exceeded: requested {requested}, maximum is {max}")]
    LimitExceeded { requested: usize, max: usize },

    /// A concurrent version write won the race; the caller should retry.
    #[error("conflict on {path}: {message}")]
    Conflict { path: String, message: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidInput(message.into())
    }

    pub fn not_found(what: impl Into<String>, hint: impl Into<String>) -> Self {
        LedgerError::NotFound {
            what: what.into(),
            hint: hint.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        LedgerError::Internal(anyhow::anyhow!(message.into()))
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "INVALID_INPUT",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            LedgerError::Conflict { .. } => "CONFLICT",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
