//! Adapter registry: an explicit map from adapter id to constructor.
//!
//! The [`AdapterRegistry`] is built once at startup and shared read-only by
//! the scheduler and the CLI; sources name their adapter by id.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::source::{AdapterConfig, SourceKind};

use super::{AdapterError, FetchAdapter, rss, tchan};

/// Similarity above which an unknown id gets a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Builds an adapter instance for one source.
pub type AdapterConstructor = Arc<
    dyn Fn(&str, &AdapterConfig) -> Result<Box<dyn FetchAdapter>, AdapterError> + Send + Sync,
>;

/// Registry entry: adapter metadata plus its constructor.
#[derive(Clone)]
pub struct AdapterDescriptor {
    id: String,
    name: String,
    description: String,
    supported_kinds: Vec<SourceKind>,
    required_config: Vec<String>,
    constructor: AdapterConstructor,
}

impl AdapterDescriptor {
    /// Creates a descriptor with no description, kinds or required keys.
    pub fn new<F>(id: impl Into<String>, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&str, &AdapterConfig) -> Result<Box<dyn FetchAdapter>, AdapterError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            supported_kinds: Vec::new(),
            required_config: Vec::new(),
            constructor: Arc::new(constructor),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_supported_kinds(mut self, kinds: &[SourceKind]) -> Self {
        self.supported_kinds = kinds.to_vec();
        self
    }

    #[must_use]
    pub fn with_required_config(mut self, keys: &[&str]) -> Self {
        self.required_config = keys.iter().map(|key| (*key).to_string()).collect();
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Serializable summary for listings.
    #[must_use]
    pub fn info(&self) -> AdapterInfo {
        AdapterInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            supported_kinds: self.supported_kinds.clone(),
            required_config: self.required_config.clone(),
        }
    }
}

impl fmt::Debug for AdapterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("supported_kinds", &self.supported_kinds)
            .field("required_config", &self.required_config)
            .finish_non_exhaustive()
    }
}

/// What an adapter is and what it needs, without the constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub supported_kinds: Vec<SourceKind>,
    pub required_config: Vec<String>,
}

/// Map from adapter id to descriptor.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, AdapterDescriptor>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::DuplicateAdapter`] if the id is taken.
    #[tracing::instrument(skip(self, descriptor), fields(adapter_id = %descriptor.id))]
    pub fn register(&mut self, descriptor: AdapterDescriptor) -> Result<(), AdapterError> {
        if self.adapters.contains_key(&descriptor.id) {
            return Err(AdapterError::DuplicateAdapter(descriptor.id));
        }
        debug!(name = %descriptor.name, "Registering adapter");
        self.adapters.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    /// Looks up a descriptor by id.
    #[must_use]
    pub fn get(&self, adapter_id: &str) -> Option<&AdapterDescriptor> {
        self.adapters.get(adapter_id)
    }

    /// Constructs the adapter `adapter_id` for `source_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UnknownAdapter`] for unregistered ids, or the
    /// constructor's [`AdapterError::Config`] when the config is invalid.
    pub fn create(
        &self,
        adapter_id: &str,
        source_id: &str,
        config: &AdapterConfig,
    ) -> Result<Box<dyn FetchAdapter>, AdapterError> {
        let descriptor = self
            .get(adapter_id)
            .ok_or_else(|| self.unknown_adapter(adapter_id))?;
        (descriptor.constructor)(source_id, config)
    }

    /// Lists registered adapters in id order.
    #[must_use]
    pub fn list(&self) -> Vec<AdapterInfo> {
        self.adapters.values().map(AdapterDescriptor::info).collect()
    }

    /// Returns the number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns true if no adapters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    fn unknown_adapter(&self, adapter_id: &str) -> AdapterError {
        let closest = self
            .adapters
            .keys()
            .map(|id| (id, strsim::jaro_winkler(adapter_id, id)))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let suggestion = match closest {
            Some((id, _)) => format!("Did you mean '{id}'?"),
            None => {
                let known: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
                format!("Registered adapters: {}", known.join(", "))
            }
        };
        AdapterError::UnknownAdapter {
            adapter: adapter_id.to_string(),
            suggestion,
        }
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        f.debug_struct("AdapterRegistry")
            .field("adapter_count", &self.adapters.len())
            .field("adapters", &ids)
            .finish()
    }
}

/// Builds the registry of built-in adapters (`rss`, `tchan`).
///
/// A failed registration is logged and skipped so the remaining adapters
/// stay usable.
#[must_use]
pub fn build_default_adapter_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for descriptor in [rss::descriptor(), tchan::descriptor()] {
        if let Err(error) = registry.register(descriptor) {
            warn!(error = %error, "Skipping adapter registration");
        }
    }
    registry
}
