//! Error types for the processing pipeline.

use thiserror::Error;

use crate::content::StoreError;

/// Errors raised by processors or while persisting their results.
#[derive(Debug, Clone, Error)]
pub enum ProcessingError {
    /// A processor could not handle an item. The pipeline logs and skips it.
    #[error("processor '{processor}' failed on item '{item_id}': {reason}")]
    Processor {
        processor: String,
        item_id: String,
        reason: String,
    },

    /// A processor with this id is already in the pipeline.
    #[error("processor '{0}' is already registered in the pipeline")]
    DuplicateProcessor(String),

    /// Reading or writing items failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcessingError {
    /// Creates a `Processor` error.
    #[must_use]
    pub fn processor(processor: &str, item_id: &str, reason: impl Into<String>) -> Self {
        Self::Processor {
            processor: processor.to_string(),
            item_id: item_id.to_string(),
            reason: reason.into(),
        }
    }
}
