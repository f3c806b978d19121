//! CLI command handlers.

mod adapters;
mod content;
mod search;
mod serve;
mod source;

pub use adapters::run_adapters_command;
pub use content::{run_import_command, run_process_command};
pub use search::run_search_command;
pub use serve::{run_fetch_command, run_serve_command};
pub use source::run_source_command;

use std::sync::Arc;

use anyhow::{Context, Result};
use digest_hub::adapter::{AdapterRegistry, build_default_adapter_registry};
use digest_hub::content::ContentStore;
use digest_hub::scheduler::Scheduler;
use digest_hub::source::SourceRegistry;
use digest_hub::Database;
use tracing::debug;

use crate::app_config::Settings;

/// Shared handles for one CLI invocation.
pub struct AppContext {
    pub settings: Settings,
    pub db: Database,
    pub adapters: Arc<AdapterRegistry>,
}

impl AppContext {
    /// Opens the database named by `settings`, creating its directory if needed.
    pub async fn open(settings: Settings) -> Result<Self> {
        if let Some(parent) = settings.database_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory '{}'", parent.display())
            })?;
        }
        let db = Database::with_options(&settings.database_path, settings.db_options)
            .await
            .with_context(|| {
                format!(
                    "Failed to open database '{}'",
                    settings.database_path.display()
                )
            })?;
        debug!(path = %settings.database_path.display(), "database opened");

        Ok(Self {
            settings,
            db,
            adapters: Arc::new(build_default_adapter_registry()),
        })
    }

    pub fn sources(&self) -> SourceRegistry {
        SourceRegistry::new(self.db.clone())
    }

    pub fn store(&self) -> ContentStore {
        ContentStore::new(self.db.clone())
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.db.clone(),
            Arc::clone(&self.adapters),
            self.settings.timing,
        )
    }
}

/// Renders a serializable value as pretty JSON on stdout.
fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
