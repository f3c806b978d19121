//! Fetch adapters: the contract between the scheduler and a content source.
//!
//! An adapter is constructed per source from `(source_id, config)`, failing
//! fast on bad config, and then fetches that source's current entries on
//! demand. Built-in adapters:
//!
//! - [`rss`] - RSS/Atom feeds over HTTP
//! - [`tchan`] - public Telegram channel previews
//!
//! New adapters are added by registering an [`AdapterDescriptor`] with the
//! [`AdapterRegistry`]; nothing is discovered implicitly.

mod error;
mod http_client;
mod item_id;
mod registry;
pub mod rss;
mod settings;
pub mod tchan;

pub use error::AdapterError;
pub use http_client::build_adapter_http_client;
pub use item_id::stable_item_id;
pub use registry::{
    AdapterConstructor, AdapterDescriptor, AdapterInfo, AdapterRegistry,
    build_default_adapter_registry,
};
pub use settings::DEFAULT_TIMEOUT_SECS;

use async_trait::async_trait;

use crate::content::NewContentItem;

/// Source-specific fetcher.
///
/// Uses `async_trait` for dyn-compatibility (Rust 2024 native async traits are
/// not object-safe with `dyn`).
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Registry id of the adapter implementation.
    fn adapter_id(&self) -> &'static str;

    /// Source this instance was built for.
    fn source_id(&self) -> &str;

    /// Fetches the source's current entries.
    ///
    /// An empty source yields `Ok(vec![])`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Connectivity`] or [`AdapterError::Protocol`]
    /// when the remote cannot be reached or answers with something unusable.
    async fn fetch(&self) -> Result<Vec<NewContentItem>, AdapterError>;

    /// Checks that the source is reachable. Never errors.
    async fn test_connection(&self) -> bool;
}
