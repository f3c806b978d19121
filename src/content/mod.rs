//! Content record store.
//!
//! Durable `SQLite` storage for retrieved items, deduplicated by canonical URL
//! (and by id), with a full-text index over title and body that triggers keep
//! in sync.
//!
//! # Overview
//!
//! - [`ContentStore`] - Main interface for content operations
//! - [`NewContentItem`] - Item as produced by an adapter or import
//! - [`ContentItem`] - Stored item with language and retrieval time
//! - [`StoreError`] - Operation error types
//!
//! # Example
//!
//! ```ignore
//! use digest_hub::content::{ContentKind, ContentStore, NewContentItem};
//!
//! let store = ContentStore::new(db);
//! let mut item = NewContentItem::new("feed-1:a1", "feed-1", ContentKind::Article);
//! item.url = Some("https://example.com/a".to_string());
//! assert_eq!(store.bulk_insert(&[item.clone()]).await?, 1);
//! assert_eq!(store.bulk_insert(&[item]).await?, 0);
//! ```

mod error;
mod item;

pub use error::StoreError;
pub use item::{
    ContentItem, ContentKind, LANGUAGE_KEY, Metadata, NewContentItem, canonicalize_url,
};

pub(crate) use item::ContentRow;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::language::{self, Language};
use crate::search::{SearchEngine, SearchError, SearchHit, SearchRequest};

/// Result type for content store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::NotFound`].
fn check_affected(id: &str, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(id.to_string()))
    } else {
        Ok(())
    }
}

fn rows_into_items(rows: Vec<ContentRow>) -> Result<Vec<ContentItem>> {
    rows.into_iter().map(ContentItem::try_from).collect()
}

fn metadata_json(id: &str, metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata).map_err(|e| StoreError::validation(id, e.to_string()))
}

/// Picks the stored language: explicit field, then metadata, then detection.
fn resolve_language(item: &NewContentItem) -> Language {
    let declared = item.language.as_deref().or_else(|| {
        item.metadata
            .get(LANGUAGE_KEY)
            .and_then(serde_json::Value::as_str)
    });
    if let Some(declared) = declared
        && let Ok(language) = declared.parse::<Language>()
    {
        return language;
    }

    let sample = if item.body.trim().is_empty() {
        item.title.as_str()
    } else {
        item.body.as_str()
    };
    language::detect(sample)
}

/// Inserts items on an open connection, skipping URL/id duplicates.
///
/// Returns the number of rows actually inserted. Callers own the transaction,
/// which lets the scheduler commit inserts together with the source's
/// retrieval timestamp.
pub(crate) async fn insert_items(
    conn: &mut SqliteConnection,
    items: &[NewContentItem],
    retrieved_at: DateTime<Utc>,
) -> Result<u64> {
    let mut inserted = 0;
    for item in items {
        if item.id.trim().is_empty() {
            return Err(StoreError::validation(&item.id, "id must not be empty"));
        }
        if item.source_id.trim().is_empty() {
            return Err(StoreError::validation(&item.id, "source_id must not be empty"));
        }

        let language = resolve_language(item);
        let mut metadata = item.metadata.clone();
        metadata.insert(
            LANGUAGE_KEY.to_string(),
            serde_json::Value::String(language.as_str().to_string()),
        );
        let metadata = metadata_json(&item.id, &metadata)?;

        let result = sqlx::query(
            r"INSERT INTO content_items (
                id,
                title,
                body,
                kind,
                url,
                author,
                published_at,
                retrieved_at,
                source_id,
                language,
                metadata,
                processed
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
              ON CONFLICT DO NOTHING",
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.body)
        .bind(item.kind.as_str())
        .bind(item.canonical_url())
        .bind(&item.author)
        .bind(item.published_at)
        .bind(retrieved_at)
        .bind(&item.source_id)
        .bind(language.as_str())
        .bind(metadata)
        .execute(&mut *conn)
        .await?;

        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Store for content items.
///
/// Cheap to clone; clones share the database pool.
#[derive(Debug, Clone)]
pub struct ContentStore {
    db: Database,
}

impl ContentStore {
    /// Creates a new store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Inserts items, skipping any whose URL (or id) is already stored.
    ///
    /// All rows go in one transaction. Returns the number of rows inserted,
    /// so re-inserting the same batch returns 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for items without id/source, or
    /// [`StoreError::Database`] if the write fails (nothing is committed).
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn bulk_insert(&self, items: &[NewContentItem]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut tx = self.db.pool().begin().await?;
        let inserted = insert_items(&mut tx, items, Utc::now()).await?;
        tx.commit().await?;
        debug!(inserted, skipped = items.len() as u64 - inserted, "bulk insert complete");
        Ok(inserted)
    }

    /// Inserts a single item. Returns `false` when it was a duplicate.
    ///
    /// # Errors
    ///
    /// Same as [`ContentStore::bulk_insert`].
    pub async fn insert(&self, item: &NewContentItem) -> Result<bool> {
        Ok(self.bulk_insert(std::slice::from_ref(item)).await? == 1)
    }

    /// Retrieves an item by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &str) -> Result<Option<ContentItem>> {
        let row = sqlx::query_as::<_, ContentRow>("SELECT * FROM content_items WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(ContentItem::try_from).transpose()
    }

    /// Lists all items of a source, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_source(&self, source_id: &str) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r"SELECT * FROM content_items
              WHERE source_id = ?
              ORDER BY retrieved_at DESC, seq DESC",
        )
        .bind(source_id)
        .fetch_all(self.db.pool())
        .await?;
        rows_into_items(rows)
    }

    /// Lists all items of a kind, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_kind(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r"SELECT * FROM content_items
              WHERE kind = ?
              ORDER BY retrieved_at DESC, seq DESC",
        )
        .bind(kind.as_str())
        .fetch_all(self.db.pool())
        .await?;
        rows_into_items(rows)
    }

    /// Returns one page of items, newest first. `page` is 1-based; 0 is
    /// treated as 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_all_paged(&self, page: u32, page_size: u32) -> Result<Vec<ContentItem>> {
        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
        let rows = sqlx::query_as::<_, ContentRow>(
            r"SELECT * FROM content_items
              ORDER BY retrieved_at DESC, seq DESC
              LIMIT ? OFFSET ?",
        )
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;
        rows_into_items(rows)
    }

    /// Returns the `limit` most recently retrieved items of a source.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn latest_for_source(&self, source_id: &str, limit: u32) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r"SELECT * FROM content_items
              WHERE source_id = ?
              ORDER BY retrieved_at DESC, seq DESC
              LIMIT ?",
        )
        .bind(source_id)
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;
        rows_into_items(rows)
    }

    /// Returns up to `limit` items not yet run through the processing pipeline,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_unprocessed(&self, limit: u32) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r"SELECT * FROM content_items
              WHERE processed = 0
              ORDER BY seq ASC
              LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;
        rows_into_items(rows)
    }

    /// Persists an edited item (everything except id, source and retrieval time).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no item has this id, or
    /// [`StoreError::Database`] if the update fails (e.g. URL collision).
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub async fn update(&self, item: &ContentItem) -> Result<()> {
        let mut metadata = item.metadata.clone();
        metadata.insert(
            LANGUAGE_KEY.to_string(),
            serde_json::Value::String(item.language.clone()),
        );
        let metadata = metadata_json(&item.id, &metadata)?;

        let result = sqlx::query(
            r"UPDATE content_items
              SET title = ?,
                  body = ?,
                  kind = ?,
                  url = ?,
                  author = ?,
                  published_at = ?,
                  language = ?,
                  metadata = ?,
                  processed = ?
              WHERE id = ?",
        )
        .bind(&item.title)
        .bind(&item.body)
        .bind(item.kind.as_str())
        .bind(item.url.as_deref().and_then(canonicalize_url))
        .bind(&item.author)
        .bind(item.published_at)
        .bind(&item.language)
        .bind(metadata)
        .bind(item.processed)
        .bind(&item.id)
        .execute(self.db.pool())
        .await?;

        check_affected(&item.id, result.rows_affected())
    }

    /// Flags an item as processed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no item has this id.
    #[instrument(skip(self))]
    pub async fn mark_processed(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE content_items SET processed = 1 WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_affected(id, result.rows_affected())
    }

    /// Deletes an item. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM content_items WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Counts stored items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM content_items")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Hybrid search with default weights.
    ///
    /// # Errors
    ///
    /// See [`SearchEngine::search`].
    pub async fn search(
        &self,
        query: &str,
        similarity_threshold: f64,
    ) -> std::result::Result<Vec<SearchHit>, SearchError> {
        SearchEngine::new(self.clone())
            .search(&SearchRequest::hybrid(query, similarity_threshold))
            .await
    }
}
