//! Source lifecycle: registry edits that keep the scheduler in step.
//!
//! Adding an enabled source starts its loop, removing a source stops its loop
//! before deleting it, and updates restart or stop the loop as needed.
//! Stored content is only deleted by [`SourceLifecycle::purge_source`].

use tracing::{info, instrument, warn};

use crate::scheduler::{Scheduler, SchedulerError};
use crate::source::{NewSource, SourceConfig, SourceRegistry, SourceUpdate};

/// Registry plus scheduler, driven together.
#[derive(Debug, Clone)]
pub struct SourceLifecycle {
    registry: SourceRegistry,
    scheduler: Scheduler,
}

impl SourceLifecycle {
    #[must_use]
    pub fn new(registry: SourceRegistry, scheduler: Scheduler) -> Self {
        Self {
            registry,
            scheduler,
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Creates a source and, if enabled, starts its loop.
    ///
    /// A loop that fails to start (for example an unknown adapter) is logged;
    /// the source stays registered so it can be fixed with an update.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Registry`] if the source cannot be created.
    #[instrument(skip(self, source), fields(name = %source.name))]
    pub async fn add_source(&self, source: NewSource) -> Result<SourceConfig, SchedulerError> {
        let created = self.registry.create(source).await?;
        if created.enabled
            && let Err(e) = self.scheduler.start(&created.id).await
        {
            warn!(source_id = %created.id, error = %e, "source added but loop not started");
        }
        Ok(created)
    }

    /// Stops the source's loop, then deletes it. Returns `false` if it did not exist.
    ///
    /// A source that still owns content is kept, and its loop is restarted
    /// if it was running.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Registry`] if the delete fails, including
    /// [`RegistryError::HasContent`](crate::source::RegistryError::HasContent).
    #[instrument(skip(self))]
    pub async fn remove_source(&self, source_id: &str) -> Result<bool, SchedulerError> {
        let was_running = self.scheduler.stop(source_id).await;
        match self.registry.delete(source_id).await {
            Ok(deleted) => {
                info!(was_running, deleted, "source removed");
                Ok(deleted)
            }
            Err(e) => {
                if was_running
                    && let Err(restart) = self.scheduler.start(source_id).await
                {
                    warn!(source_id, error = %restart, "loop not restarted after failed removal");
                }
                Err(e.into())
            }
        }
    }

    /// Stops the source's loop, then deletes it with all of its content.
    /// Returns the number of items removed, or `None` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Registry`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn purge_source(&self, source_id: &str) -> Result<Option<u64>, SchedulerError> {
        let was_running = self.scheduler.stop(source_id).await;
        let purged = self.registry.purge(source_id).await?;
        info!(was_running, ?purged, "source purged");
        Ok(purged)
    }

    /// Applies an update and reconciles the loop.
    ///
    /// A running loop is restarted so it picks up the new definition right
    /// away; a disabled source is stopped; an enabled source that was not
    /// running is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Registry`] if the update fails, or the
    /// error of restarting the loop.
    #[instrument(skip(self, update))]
    pub async fn update_source(
        &self,
        source_id: &str,
        update: SourceUpdate,
    ) -> Result<SourceConfig, SchedulerError> {
        let updated = self.registry.update(source_id, update).await?;
        let was_running = self.scheduler.stop(source_id).await;
        if updated.enabled && was_running {
            self.scheduler.start(source_id).await?;
        }
        Ok(updated)
    }
}
