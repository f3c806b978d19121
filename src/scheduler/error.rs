//! Error types for the scheduler.

use thiserror::Error;

use crate::adapter::AdapterError;
use crate::content::StoreError;
use crate::source::RegistryError;

/// Errors returned by scheduler control operations and fetch cycles.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No source with this id is registered.
    #[error(
        "source not found: {0}\n  Suggestion: Run `digest-hub source list` to see configured sources"
    )]
    NotFound(String),

    /// A live loop already exists for this source.
    #[error("source '{0}' is already running")]
    AlreadyRunning(String),

    /// The source exists but is disabled.
    #[error(
        "source '{0}' is disabled\n  Suggestion: Enable it with `digest-hub source update {0} --enable`"
    )]
    Disabled(String),

    /// Adapter construction or fetch failed.
    #[error("adapter error for source '{source_id}': {source}")]
    Adapter {
        source_id: String,
        #[source]
        source: AdapterError,
    },

    /// Source registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Content store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::from(err))
    }
}

impl SchedulerError {
    /// Wraps an adapter error with the source it belongs to.
    #[must_use]
    pub fn adapter(source_id: &str, source: AdapterError) -> Self {
        Self::Adapter {
            source_id: source_id.to_string(),
            source,
        }
    }
}
