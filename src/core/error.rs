//! Error types for reservation operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input, rejected before touching the store.
    Validation,
    /// The request is well-formed but conflicts with current state.
    Conflict,
    /// Unknown business, location, resource, booking or waitlist entry.
    NotFound,
    /// Store, lock or cache unreachable or timed out. Safe to retry.
    Unavailable,
    /// Anything else.
    Internal,
}

/// Errors produced by reservation components and their collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// Malformed input (bad date, party size out of range, ...).
    #[error("invalid request: {0}")]
    Validation(String),
    /// State conflict (illegal transition, duplicate waitlist entry, overlapping write).
    #[error("conflict: {0}")]
    Conflict(String),
    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Transient infrastructure failure.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Unexpected failure with internal context.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReservationError {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Message safe to show to a caller. Internal detail is never exposed.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ReservationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}

/// Result alias for reservation operations.
pub type ReservationResult<T> = Result<T, ReservationError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
