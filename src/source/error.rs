//! Error types for source registry operations.

use thiserror::Error;

use crate::db::DbErrorKind;

/// Errors that can occur during source registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Source not found.
    #[error(
        "source not found: {0}\n  Suggestion: Run `digest-hub source list` to see configured source ids"
    )]
    NotFound(String),

    /// A source with this id already exists.
    #[error(
        "source already exists: {0}\n  Suggestion: Choose a different id, or omit it to derive one from the name"
    )]
    Conflict(String),

    /// The source still owns stored content and was not purged.
    #[error(
        "source {id} still has {items} stored items\n  Suggestion: Run `digest-hub source remove {id} --purge` to delete the source together with its content"
    )]
    HasContent {
        /// Source id.
        id: String,
        /// Number of stored items owned by the source.
        items: i64,
    },

    /// Source definition rejected before reaching the database.
    #[error("invalid source field `{field}`: {reason}")]
    Validation {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for retry decisions.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl RegistryError {
    /// Creates a `Validation` error.
    #[must_use]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
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
            Self::NotFound(_)
            | Self::Conflict(_)
            | Self::HasContent { .. }
            | Self::Validation { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_messages_carry_suggestions() {
        let msg = RegistryError::NotFound("feed-1".to_string()).to_string();
        assert!(msg.contains("feed-1"));
        assert!(msg.contains("source list"));

        let msg = RegistryError::Conflict("feed-1".to_string()).to_string();
        assert!(msg.contains("already exists"));
        assert!(msg.contains("Suggestion"));

        let msg = RegistryError::HasContent {
            id: "feed-1".to_string(),
            items: 3,
        }
        .to_string();
        assert!(msg.contains("3 stored items"));
        assert!(msg.contains("--purge"));
    }

    #[test]
    fn test_registry_error_validation_names_field() {
        let err = RegistryError::validation("name", "must not be empty");
        assert_eq!(
            err.to_string(),
            "invalid source field `name`: must not be empty"
        );
        assert_eq!(err.database_kind(), None);
    }
}
