//! A single fetch cycle: fetch, then insert and stamp in one transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::adapter::FetchAdapter;
use crate::content::{self, NewContentItem};
use crate::db::Database;
use crate::source;

use super::SchedulerError;

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    /// Items returned by the adapter.
    pub fetched: usize,
    /// Items that were new and got stored.
    pub inserted: u64,
    /// Timestamp written to the source's `last_retrieved`.
    pub retrieved_at: DateTime<Utc>,
}

impl CycleOutcome {
    /// Items skipped as duplicates.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        (self.fetched as u64).saturating_sub(self.inserted)
    }
}

/// Asks the adapter for the source's current entries.
pub(crate) async fn fetch_items(
    adapter: &dyn FetchAdapter,
    source_id: &str,
) -> Result<Vec<NewContentItem>, SchedulerError> {
    adapter
        .fetch()
        .await
        .map_err(|e| SchedulerError::adapter(source_id, e))
}

/// Stores fetched items and records the retrieval time atomically.
///
/// Either both the inserts and the `last_retrieved` update are committed, or
/// neither is. A source deleted since the fetch yields
/// [`SchedulerError::NotFound`] (or a constraint failure from the inserts)
/// and nothing is written.
#[instrument(skip(db, items), fields(count = items.len()))]
pub(crate) async fn persist_items(
    db: &Database,
    source_id: &str,
    items: &[NewContentItem],
) -> Result<CycleOutcome, SchedulerError> {
    let retrieved_at = Utc::now();
    let mut tx = db.pool().begin().await?;
    let inserted = content::insert_items(&mut tx, items, retrieved_at).await?;
    if !source::touch_last_retrieved_on(&mut tx, source_id, retrieved_at).await? {
        return Err(SchedulerError::NotFound(source_id.to_string()));
    }
    tx.commit().await?;

    debug!(inserted, "cycle committed");
    Ok(CycleOutcome {
        fetched: items.len(),
        inserted,
        retrieved_at,
    })
}

/// Runs one complete cycle for `source_id` with an already-built adapter.
///
/// # Errors
///
/// Returns [`SchedulerError::Adapter`] when the fetch fails, or a store or
/// registry error when persisting fails.
pub async fn run_cycle(
    db: &Database,
    adapter: &dyn FetchAdapter,
    source_id: &str,
) -> Result<CycleOutcome, SchedulerError> {
    let items = fetch_items(adapter, source_id).await?;
    persist_items(db, source_id, &items).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use crate::content::{ContentKind, ContentStore};
    use crate::source::{NewSource, SourceKind, SourceRegistry};
    use async_trait::async_trait;

    struct StaticAdapter {
        items: Vec<NewContentItem>,
        fail: bool,
    }

    #[async_trait]
    impl FetchAdapter for StaticAdapter {
        fn adapter_id(&self) -> &'static str {
            "static"
        }

        fn source_id(&self) -> &str {
            "feed-1"
        }

        async fn fetch(&self) -> Result<Vec<NewContentItem>, AdapterError> {
            if self.fail {
                return Err(AdapterError::connectivity("static", "offline"));
            }
            Ok(self.items.clone())
        }

        async fn test_connection(&self) -> bool {
            !self.fail
        }
    }

    fn items() -> Vec<NewContentItem> {
        ["a", "b", "c"]
            .iter()
            .map(|n| {
                let mut item =
                    NewContentItem::new(format!("feed-1:{n}"), "feed-1", ContentKind::Article);
                item.url = Some(format!("https://example.com/{n}"));
                item
            })
            .collect()
    }

    async fn setup() -> (Database, SourceRegistry) {
        let db = Database::new_in_memory().await.unwrap();
        let registry = SourceRegistry::new(db.clone());
        let mut source = NewSource::new("Feed One", SourceKind::Rss, "static");
        source.id = Some("feed-1".to_string());
        registry.create(source).await.unwrap();
        (db, registry)
    }

    #[tokio::test]
    async fn test_cycle_inserts_and_stamps_source() {
        let (db, registry) = setup().await;
        let adapter = StaticAdapter {
            items: items(),
            fail: false,
        };

        let outcome = run_cycle(&db, &adapter, "feed-1").await.unwrap();
        assert_eq!(outcome.fetched, 3);
        assert_eq!(outcome.inserted, 3);

        let source = registry.get_by_id("feed-1").await.unwrap().unwrap();
        assert_eq!(source.last_retrieved, Some(outcome.retrieved_at));

        let again = run_cycle(&db, &adapter, "feed-1").await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.skipped(), 3);
        assert_eq!(ContentStore::new(db).count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_source_untouched() {
        let (db, registry) = setup().await;
        let adapter = StaticAdapter {
            items: Vec::new(),
            fail: true,
        };

        let err = run_cycle(&db, &adapter, "feed-1").await.unwrap_err();
        assert!(matches!(err, SchedulerError::Adapter { .. }));
        let source = registry.get_by_id("feed-1").await.unwrap().unwrap();
        assert!(source.last_retrieved.is_none());
    }

    #[tokio::test]
    async fn test_deleted_source_rolls_back() {
        let (db, registry) = setup().await;
        registry.delete("feed-1").await.unwrap();
        let adapter = StaticAdapter {
            items: Vec::new(),
            fail: false,
        };

        let err = run_cycle(&db, &adapter, "feed-1").await.unwrap_err();
        assert!(matches!(err, SchedulerError::NotFound(id) if id == "feed-1"));
    }
}
