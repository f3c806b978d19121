//! Source registry.
//!
//! Durable storage of configured sources. The scheduler keeps only a source
//! id per running loop and re-reads the definition here on every check, so
//! edits take effect at the next cycle boundary.

mod config;
mod error;

pub use config::{
    AdapterConfig, Cadence, NewSource, SourceConfig, SourceKind, SourceUpdate, derive_source_id,
};
pub use error::RegistryError;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{info, instrument};

use crate::db::{self, Database};
use config::SourceRow;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

fn rows_into_sources(rows: Vec<SourceRow>) -> Result<Vec<SourceConfig>> {
    rows.into_iter().map(SourceConfig::try_from).collect()
}

fn to_json<T: serde::Serialize>(field: &'static str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| RegistryError::validation(field, e.to_string()))
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(RegistryError::validation("id", "must not be empty"));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(RegistryError::validation("id", "must not contain whitespace"));
    }
    Ok(())
}

fn validate_definition(name: &str, adapter_id: &str, cadence: &Cadence) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RegistryError::validation("name", "must not be empty"));
    }
    if adapter_id.trim().is_empty() {
        return Err(RegistryError::validation("adapter_id", "must not be empty"));
    }
    if let Cadence::Seconds(secs) = *cadence {
        Cadence::every(secs).map_err(|reason| RegistryError::validation("cadence", reason))?;
    }
    Ok(())
}

/// Stamps a source's retrieval time on an open connection.
///
/// Returns `false` when the source no longer exists.
pub(crate) async fn touch_last_retrieved_on(
    conn: &mut SqliteConnection,
    id: &str,
    at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE sources SET last_retrieved = ? WHERE id = ?")
        .bind(at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Registry of configured sources.
///
/// Cheap to clone; clones share the database pool.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    db: Database,
}

impl SourceRegistry {
    /// Creates a new registry over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Persists a new source.
    ///
    /// The adapter id is not resolved here; it must exist when the source is
    /// scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for blank name/adapter/id or a
    /// zero-second cadence, [`RegistryError::Conflict`] if the id is taken, or
    /// [`RegistryError::Database`] if the insert fails.
    #[instrument(skip(self, source), fields(name = %source.name, adapter = %source.adapter_id))]
    pub async fn create(&self, source: NewSource) -> Result<SourceConfig> {
        validate_definition(&source.name, &source.adapter_id, &source.cadence)?;
        let id = match source.id {
            Some(id) => {
                validate_id(&id)?;
                id
            }
            None => derive_source_id(&source.name),
        };

        let now = Utc::now();
        let created = SourceConfig {
            id,
            name: source.name,
            kind: source.kind,
            adapter_id: source.adapter_id,
            cadence: source.cadence,
            config: source.config,
            tags: source.tags,
            enabled: source.enabled,
            created_at: now,
            updated_at: now,
            last_retrieved: None,
        };

        let result = sqlx::query(
            r"INSERT INTO sources (
                id,
                name,
                kind,
                adapter_id,
                cadence,
                config,
                tags,
                enabled,
                created_at,
                updated_at
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&created.id)
        .bind(&created.name)
        .bind(created.kind.as_str())
        .bind(&created.adapter_id)
        .bind(created.cadence.to_string())
        .bind(to_json("config", &created.config)?)
        .bind(to_json("tags", &created.tags)?)
        .bind(created.enabled)
        .bind(created.created_at)
        .bind(created.updated_at)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => {
                info!(source_id = %created.id, "source created");
                Ok(created)
            }
            Err(e) if db::is_unique_violation(&e) => Err(RegistryError::Conflict(created.id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Retrieves a source by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &str) -> Result<Option<SourceConfig>> {
        let row = sqlx::query_as::<_, SourceRow>("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(SourceConfig::try_from).transpose()
    }

    /// Retrieves the first source (by creation time) with this display name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_name(&self, name: &str) -> Result<Option<SourceConfig>> {
        let row = sqlx::query_as::<_, SourceRow>(
            "SELECT * FROM sources WHERE name = ? ORDER BY created_at, id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(self.db.pool())
        .await?;
        row.map(SourceConfig::try_from).transpose()
    }

    /// Lists every source, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Database`] if the query fails.
    pub async fn get_all(&self) -> Result<Vec<SourceConfig>> {
        let rows = sqlx::query_as::<_, SourceRow>("SELECT * FROM sources ORDER BY created_at, id")
            .fetch_all(self.db.pool())
            .await?;
        rows_into_sources(rows)
    }

    /// Lists enabled sources, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Database`] if the query fails.
    pub async fn get_enabled(&self) -> Result<Vec<SourceConfig>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT * FROM sources WHERE enabled = 1 ORDER BY created_at, id",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows_into_sources(rows)
    }

    /// Lists sources of one kind, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_kind(&self, kind: SourceKind) -> Result<Vec<SourceConfig>> {
        let rows = sqlx::query_as::<_, SourceRow>(
            "SELECT * FROM sources WHERE kind = ? ORDER BY created_at, id",
        )
        .bind(kind.as_str())
        .fetch_all(self.db.pool())
        .await?;
        rows_into_sources(rows)
    }

    /// Applies a partial update in place; the id never changes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the source does not exist,
    /// [`RegistryError::Validation`] if the result would be invalid, or
    /// [`RegistryError::Database`] if the write fails.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: &str, update: SourceUpdate) -> Result<SourceConfig> {
        let mut source = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        update.apply(&mut source);
        validate_definition(&source.name, &source.adapter_id, &source.cadence)?;
        source.updated_at = Utc::now();

        let result = sqlx::query(
            r"UPDATE sources
              SET name = ?,
                  kind = ?,
                  adapter_id = ?,
                  cadence = ?,
                  config = ?,
                  tags = ?,
                  enabled = ?,
                  updated_at = ?
              WHERE id = ?",
        )
        .bind(&source.name)
        .bind(source.kind.as_str())
        .bind(&source.adapter_id)
        .bind(source.cadence.to_string())
        .bind(to_json("config", &source.config)?)
        .bind(to_json("tags", &source.tags)?)
        .bind(source.enabled)
        .bind(source.updated_at)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        Ok(source)
    }

    /// Deletes a source that owns no stored content. Returns `false` if it
    /// did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::HasContent`] if items still reference the
    /// source (see [`SourceRegistry::purge`]), or [`RegistryError::Database`]
    /// if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;
        let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_items WHERE source_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if items > 0 {
            return Err(RegistryError::HasContent {
                id: id.to_string(),
                items,
            });
        }
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(source_id = %id, "source deleted");
        }
        Ok(deleted)
    }

    /// Deletes a source together with all of its stored content, in one
    /// transaction. Returns the number of items removed, or `None` if the
    /// source did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn purge(&self, id: &str) -> Result<Option<u64>> {
        let mut tx = self.db.pool().begin().await?;
        let items = sqlx::query("DELETE FROM content_items WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        tx.commit().await?;

        info!(source_id = %id, items, "source purged with its content");
        Ok(Some(items))
    }

    /// Records a retrieval time. Returns `false` if the source does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Database`] if the write fails.
    #[instrument(skip(self))]
    pub async fn touch_last_retrieved(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.db.pool().acquire().await?;
        touch_last_retrieved_on(&mut conn, id, at).await
    }
}
