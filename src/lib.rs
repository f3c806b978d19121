//! Digest Hub Core Library
//!
//! Polls configured content sources on a schedule, stores what they publish
//! deduplicated by URL, and serves hybrid full-text + fuzzy search over the
//! collected corpus.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`source`] - Source registry (what to poll, how often, with which adapter)
//! - [`content`] - Content store with URL deduplication and full-text index
//! - [`adapter`] - Fetch adapters (RSS/Atom, Telegram channel previews)
//! - [`scheduler`] - One cancellable polling loop per enabled source
//! - [`lifecycle`] - Registry edits that keep the scheduler in step
//! - [`search`] - Hybrid lexical + trigram search
//! - [`processing`] - Post-retrieval processors (cleaning, language, keywords)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod content;
pub mod db;
pub mod language;
pub mod lifecycle;
pub mod processing;
pub mod scheduler;
pub mod search;
pub mod source;
pub mod text;
mod user_agent;

// Re-export commonly used types
pub use adapter::{AdapterError, AdapterRegistry, FetchAdapter, build_default_adapter_registry};
pub use content::{ContentItem, ContentKind, ContentStore, NewContentItem, StoreError};
pub use db::{Database, DatabaseOptions, DbError};
pub use lifecycle::SourceLifecycle;
pub use processing::{ProcessingPipeline, Processor, process_pending};
pub use scheduler::{Scheduler, SchedulerError, SchedulerTiming};
pub use search::{SearchEngine, SearchHit, SearchMode, SearchRequest, SearchWeights};
pub use source::{Cadence, NewSource, RegistryError, SourceConfig, SourceKind, SourceRegistry};
