//! Error types for search.

use thiserror::Error;

use crate::content::StoreError;

/// Errors that can occur while searching.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// Threshold is NaN or outside `[0, 1]`.
    #[error(
        "invalid similarity threshold: {0}\n  Suggestion: Use a value between 0.0 and 1.0 (default 0.3)"
    )]
    InvalidThreshold(f64),

    /// Blend weights are out of range or do not sum to 1.
    #[error(
        "invalid search weights: lexical={lexical}, fuzzy={fuzzy}\n  Suggestion: Each weight must be in [0, 1] and together they must sum to 1.0"
    )]
    InvalidWeights {
        /// Weight of the full-text rank.
        lexical: f64,
        /// Weight of the trigram similarity.
        fuzzy: f64,
    },

    /// The content store failed underneath the search.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for SearchError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::from(err))
    }
}
