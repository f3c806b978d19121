//! Error types for content store operations.

use thiserror::Error;

use crate::db::DbErrorKind;

/// Errors that can occur during content store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for retry decisions.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Content item not found.
    #[error(
        "content item not found: {0}\n  Suggestion: The item may have been deleted or the ID is incorrect"
    )]
    NotFound(String),

    /// Item rejected before reaching the database.
    #[error("invalid content item '{id}': {reason}")]
    Validation {
        /// Offending item id (may be empty).
        id: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl StoreError {
    /// Creates a `Validation` error.
    #[must_use]
    pub fn validation(id: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `Database` error for a stored value that failed to decode.
    #[must_use]
    pub fn decode(column: &str, detail: impl std::fmt::Display) -> Self {
        Self::Database {
            kind: DbErrorKind::Decode,
            message: format!("column `{column}`: {detail}"),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::NotFound(_) | Self::Validation { .. } => None,
        }
    }

    /// Returns true when this error is a database busy/locked condition.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(DbErrorKind::BusyOrLocked)
    }
}
