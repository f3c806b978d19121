//! Post-retrieval processing pipeline.
//!
//! A [`ProcessingPipeline`] runs stored items through an ordered list of
//! [`Processor`]s. A failing processor is logged and skipped; the item still
//! leaves the pipeline marked as processed. [`process_pending`] applies a
//! pipeline to unprocessed items in the store and persists the results.
//!
//! Built-in processors:
//!
//! - [`HtmlCleaner`] (`html_cleaner`)
//! - [`LanguageDetector`] (`language_detector`)
//! - [`KeywordExtractor`] (`keyword_extractor`)

mod cleaners;
mod enrichers;
mod error;

pub use cleaners::HtmlCleaner;
pub use enrichers::{KEYWORDS_KEY, KeywordExtractor, LanguageDetector, MAX_KEYWORDS};
pub use error::ProcessingError;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::content::{ContentItem, ContentStore};

/// Default number of items handled by one [`process_pending`] call.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// One step of the pipeline.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Unique id within a pipeline.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Returns the transformed item.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::Processor`] when the item cannot be
    /// handled; the pipeline then continues with the unchanged item.
    async fn process(&self, item: &ContentItem) -> Result<ContentItem, ProcessingError>;
}

/// Ordered list of processors.
#[derive(Default, Clone)]
pub struct ProcessingPipeline {
    processors: Vec<Arc<dyn Processor>>,
}

impl fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingPipeline")
            .field("processors", &self.processor_ids())
            .finish()
    }
}

impl ProcessingPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline with the built-ins: clean, detect language, extract keywords.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            processors: vec![
                Arc::new(HtmlCleaner),
                Arc::new(LanguageDetector),
                Arc::new(KeywordExtractor::new()),
            ],
        }
    }

    /// Appends a processor.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::DuplicateProcessor`] if its id is taken.
    pub fn add(&mut self, processor: Arc<dyn Processor>) -> Result<(), ProcessingError> {
        if self.processors.iter().any(|p| p.id() == processor.id()) {
            return Err(ProcessingError::DuplicateProcessor(
                processor.id().to_string(),
            ));
        }
        debug!(processor = processor.id(), "processor added");
        self.processors.push(processor);
        Ok(())
    }

    /// Removes the processor `id`. Returns `false` if it was not present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.processors.len();
        self.processors.retain(|p| p.id() != id);
        self.processors.len() != before
    }

    pub fn clear(&mut self) {
        self.processors.clear();
    }

    /// Processor ids in execution order.
    #[must_use]
    pub fn processor_ids(&self) -> Vec<String> {
        self.processors.iter().map(|p| p.id().to_string()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Runs every processor in order and marks the result processed.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn process(&self, item: ContentItem) -> ContentItem {
        let mut current = item;
        for processor in &self.processors {
            match processor.process(&current).await {
                Ok(next) => current = next,
                Err(e) => warn!(
                    processor = processor.id(),
                    error = %e,
                    "processor failed, skipping"
                ),
            }
        }
        current.processed = true;
        current
    }

    /// Processes items one after another, preserving order.
    pub async fn process_batch(&self, items: Vec<ContentItem>) -> Vec<ContentItem> {
        let mut processed = Vec::with_capacity(items.len());
        for item in items {
            processed.push(self.process(item).await);
        }
        processed
    }
}

/// Outcome of [`process_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// Items processed and saved.
    pub processed: usize,
    /// Items whose result could not be saved; they are flagged processed
    /// without their changes.
    pub failed: usize,
}

/// Runs `pipeline` over up to `limit` unprocessed items and saves them.
///
/// # Errors
///
/// Returns [`ProcessingError::Store`] if unprocessed items cannot be loaded,
/// or if an item can neither be saved nor flagged processed.
#[instrument(skip(store, pipeline))]
pub async fn process_pending(
    store: &ContentStore,
    pipeline: &ProcessingPipeline,
    limit: u32,
) -> Result<ProcessReport, ProcessingError> {
    let pending = store.get_unprocessed(limit).await?;
    let mut report = ProcessReport::default();

    for item in pipeline.process_batch(pending).await {
        match store.update(&item).await {
            Ok(()) => report.processed += 1,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "failed to save processed item");
                store.mark_processed(&item.id).await?;
                report.failed += 1;
            }
        }
    }

    info!(
        processed = report.processed,
        failed = report.failed,
        "processing pass complete"
    );
    Ok(report)
}
