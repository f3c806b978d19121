//! Per-source fetch loops.
//!
//! The [`Scheduler`] runs at most one background task per source. Each task
//! re-reads its source from the registry on every check, sleeps until the
//! source's cadence is due, runs a cycle ([`cycle`]) and backs off for a
//! cooldown after failures. Every loop owns a [`CancellationToken`]; stopping
//! a source cancels the token and awaits the task.
//!
//! Cancellation is honoured while sleeping and while the adapter is fetching.
//! Once a fetch has returned, its inserts and the source's `last_retrieved`
//! stamp are committed together, so a stop never leaves half a cycle behind.

mod cycle;
mod error;

pub use cycle::{CycleOutcome, run_cycle};
pub use error::SchedulerError;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::adapter::{AdapterRegistry, FetchAdapter};
use crate::db::Database;
use crate::source::{SourceConfig, SourceRegistry};

/// Default pause between due-checks of an idle loop.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Default pause after a failed cycle.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Upper bound of the random extra cooldown, as a fraction of the cooldown.
const COOLDOWN_JITTER_DIVISOR: u128 = 10;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Loop timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    /// Longest sleep between two looks at the source.
    pub check_interval: Duration,
    /// Pause after a failed cycle (plus up to 10% jitter).
    pub cooldown: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Why a source loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    /// Stopped through its cancellation token.
    Cancelled,
    /// The source was deleted from the registry.
    SourceRemoved,
    /// The source was disabled.
    SourceDisabled,
}

/// Result of [`Scheduler::start_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartSummary {
    pub started: Vec<String>,
    pub already_running: Vec<String>,
    /// Source id and error message for each source that could not start.
    pub failed: Vec<(String, String)>,
}

/// Result of [`Scheduler::stop_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopSummary {
    /// Source id and exit reason of each loop that ended normally.
    pub stopped: Vec<(String, LoopExit)>,
    /// Source id and join error of each loop that panicked.
    pub panicked: Vec<(String, String)>,
}

struct LoopHandle {
    token: CancellationToken,
    handle: JoinHandle<LoopExit>,
    generation: u64,
}

impl LoopHandle {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Everything a spawned loop needs; shared with the [`Scheduler`].
struct LoopContext {
    db: Database,
    sources: SourceRegistry,
    adapters: Arc<AdapterRegistry>,
    timing: SchedulerTiming,
    loops: DashMap<String, LoopHandle>,
    next_generation: AtomicU64,
}

/// Owns the per-source loops.
///
/// Cheap to clone; clones control the same set of loops.
#[derive(Clone)]
pub struct Scheduler {
    ctx: Arc<LoopContext>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("timing", &self.ctx.timing)
            .field("running", &self.running_sources())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler with no running loops.
    #[must_use]
    pub fn new(db: Database, adapters: Arc<AdapterRegistry>, timing: SchedulerTiming) -> Self {
        Self {
            ctx: Arc::new(LoopContext {
                sources: SourceRegistry::new(db.clone()),
                db,
                adapters,
                timing,
                loops: DashMap::new(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn timing(&self) -> SchedulerTiming {
        self.ctx.timing
    }

    /// Starts the loop for `source_id`.
    ///
    /// The adapter is built before anything is spawned, so config problems
    /// surface here rather than inside the loop.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::NotFound`] if the source does not exist
    /// - [`SchedulerError::Disabled`] if it is disabled
    /// - [`SchedulerError::Adapter`] if the adapter cannot be built
    /// - [`SchedulerError::AlreadyRunning`] if a live loop exists
    #[instrument(skip(self))]
    pub async fn start(&self, source_id: &str) -> Result<()> {
        let source = self.load_source(source_id).await?;
        if !source.enabled {
            return Err(SchedulerError::Disabled(source.id));
        }
        let adapter = build_adapter(&self.ctx.adapters, &source)?;

        match self.ctx.loops.entry(source.id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    warn!(source_id = %source.id, "source loop already running");
                    return Err(SchedulerError::AlreadyRunning(source.id));
                }
                debug!(source_id = %source.id, "replacing finished source loop");
                occupied.insert(self.spawn_loop(&source, adapter));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.spawn_loop(&source, adapter));
            }
        }
        info!(source_id = %source.id, cadence = %source.cadence, "source loop started");
        Ok(())
    }

    /// Stops the loop for `source_id` and waits for it to finish.
    ///
    /// Returns `false` when no loop was registered.
    #[instrument(skip(self))]
    pub async fn stop(&self, source_id: &str) -> bool {
        let Some((_, handle)) = self.ctx.loops.remove(source_id) else {
            debug!("no loop to stop");
            return false;
        };
        handle.token.cancel();
        match handle.handle.await {
            Ok(exit) => info!(?exit, "source loop stopped"),
            Err(e) => warn!(error = %e, "source loop panicked"),
        }
        true
    }

    /// Starts a loop for every enabled source.
    ///
    /// Per-source failures are logged and collected, not propagated.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Registry`] only if the source list cannot be
    /// read.
    #[instrument(skip(self))]
    pub async fn start_all(&self) -> Result<StartSummary> {
        let mut summary = StartSummary::default();
        for source in self.ctx.sources.get_enabled().await? {
            match self.start(&source.id).await {
                Ok(()) => summary.started.push(source.id),
                Err(SchedulerError::AlreadyRunning(id)) => summary.already_running.push(id),
                Err(e) => {
                    warn!(source_id = %source.id, error = %e, "failed to start source loop");
                    summary.failed.push((source.id, e.to_string()));
                }
            }
        }
        info!(
            started = summary.started.len(),
            failed = summary.failed.len(),
            "start_all complete"
        );
        Ok(summary)
    }

    /// Cancels every loop, then awaits all of them.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) -> StopSummary {
        let ids: Vec<String> = self
            .ctx
            .loops
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let handles: Vec<(String, LoopHandle)> = ids
            .iter()
            .filter_map(|id| self.ctx.loops.remove(id))
            .collect();
        for (_, handle) in &handles {
            handle.token.cancel();
        }

        let results = join_all(
            handles
                .into_iter()
                .map(|(id, handle)| async move { (id, handle.handle.await) }),
        )
        .await;

        let mut summary = StopSummary::default();
        for (id, result) in results {
            match result {
                Ok(exit) => summary.stopped.push((id, exit)),
                Err(e) => {
                    warn!(source_id = %id, error = %e, "source loop panicked");
                    summary.panicked.push((id, e.to_string()));
                }
            }
        }
        info!(stopped = summary.stopped.len(), "all source loops stopped");
        summary
    }

    /// Runs one cycle for `source_id` outside of its loop.
    ///
    /// Works for disabled and manual-cadence sources too.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] for unknown sources, or the
    /// adapter/store error that failed the cycle.
    #[instrument(skip(self))]
    pub async fn one_off_fetch(&self, source_id: &str) -> Result<CycleOutcome> {
        let source = self.load_source(source_id).await?;
        let adapter = build_adapter(&self.ctx.adapters, &source)?;
        let outcome = run_cycle(&self.ctx.db, adapter.as_ref(), &source.id).await?;
        info!(
            fetched = outcome.fetched,
            inserted = outcome.inserted,
            "one-off fetch complete"
        );
        Ok(outcome)
    }

    /// Whether a live loop exists for `source_id`.
    #[must_use]
    pub fn is_running(&self, source_id: &str) -> bool {
        self.ctx
            .loops
            .get(source_id)
            .is_some_and(|handle| handle.is_live())
    }

    /// Ids of sources with a live loop, sorted.
    #[must_use]
    pub fn running_sources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .ctx
            .loops
            .iter()
            .filter(|entry| entry.value().is_live())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    async fn load_source(&self, source_id: &str) -> Result<SourceConfig> {
        self.ctx
            .sources
            .get_by_id(source_id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(source_id.to_string()))
    }

    fn spawn_loop(&self, source: &SourceConfig, adapter: Box<dyn FetchAdapter>) -> LoopHandle {
        let token = CancellationToken::new();
        let generation = self.ctx.next_generation.fetch_add(1, Ordering::Relaxed);
        let ctx = Arc::clone(&self.ctx);
        let source_id = source.id.clone();
        let adapter_version = source.updated_at;
        let loop_token = token.clone();

        let span = info_span!("source_loop", source_id = %source_id);
        let handle = tokio::spawn(
            async move {
                let exit =
                    run_loop(&ctx, &source_id, adapter, adapter_version, &loop_token).await;
                ctx.loops
                    .remove_if(&source_id, |_, handle| handle.generation == generation);
                info!(?exit, "source loop exited");
                exit
            }
            .instrument(span),
        );

        LoopHandle {
            token,
            handle,
            generation,
        }
    }
}

fn build_adapter(
    adapters: &AdapterRegistry,
    source: &SourceConfig,
) -> Result<Box<dyn FetchAdapter>> {
    adapters
        .create(&source.adapter_id, &source.id, &source.config)
        .map_err(|e| SchedulerError::adapter(&source.id, e))
}

/// Sleeps for `duration` unless cancelled first. Returns `false` on cancel.
async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

/// Adds up to 10% random extra time so failing sources drift apart.
fn with_jitter(base: Duration) -> Duration {
    let max_ms = u64::try_from(base.as_millis() / COOLDOWN_JITTER_DIVISOR).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return base;
    }
    let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
    base + Duration::from_millis(jitter_ms)
}

async fn run_loop(
    ctx: &LoopContext,
    source_id: &str,
    mut adapter: Box<dyn FetchAdapter>,
    mut adapter_version: DateTime<Utc>,
    token: &CancellationToken,
) -> LoopExit {
    let timing = ctx.timing;
    loop {
        if token.is_cancelled() {
            return LoopExit::Cancelled;
        }

        let source = match ctx.sources.get_by_id(source_id).await {
            Ok(Some(source)) => source,
            Ok(None) => return LoopExit::SourceRemoved,
            Err(e) => {
                warn!(error = %e, "failed to reload source");
                if !sleep_or_cancel(token, with_jitter(timing.cooldown)).await {
                    return LoopExit::Cancelled;
                }
                continue;
            }
        };
        if !source.enabled {
            return LoopExit::SourceDisabled;
        }

        if source.updated_at != adapter_version {
            match build_adapter(&ctx.adapters, &source) {
                Ok(rebuilt) => {
                    debug!(adapter_id = %source.adapter_id, "source changed, adapter rebuilt");
                    adapter = rebuilt;
                    adapter_version = source.updated_at;
                }
                Err(e) => {
                    warn!(error = %e, "updated source config is unusable");
                    if !sleep_or_cancel(token, with_jitter(timing.cooldown)).await {
                        return LoopExit::Cancelled;
                    }
                    continue;
                }
            }
        }

        let wait = match source.time_until_due(Utc::now()) {
            None => timing.check_interval,
            Some(remaining) => remaining.min(timing.check_interval),
        };
        if !wait.is_zero() {
            if !sleep_or_cancel(token, wait).await {
                return LoopExit::Cancelled;
            }
            continue;
        }

        let fetched = tokio::select! {
            biased;
            () = token.cancelled() => return LoopExit::Cancelled,
            fetched = cycle::fetch_items(adapter.as_ref(), source_id) => fetched,
        };
        let result = match fetched {
            Ok(items) => cycle::persist_items(&ctx.db, source_id, &items).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => info!(
                fetched = outcome.fetched,
                inserted = outcome.inserted,
                "cycle complete"
            ),
            Err(SchedulerError::NotFound(_)) => return LoopExit::SourceRemoved,
            Err(e) => {
                warn!(error = %e, "cycle failed, cooling down");
                if !sleep_or_cancel(token, with_jitter(timing.cooldown)).await {
                    return LoopExit::Cancelled;
                }
            }
        }
    }
}
