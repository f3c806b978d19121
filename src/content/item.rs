//! Content item types and kind definitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;

use super::StoreError;

/// Free-form per-item attributes (feed title, categories, keywords, ...).
///
/// Values keep their JSON type; `language` is mirrored here for consumers
/// that only read metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key mirroring [`ContentItem::language`].
pub const LANGUAGE_KEY: &str = "language";

/// Kind of a content item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Article,
    Post,
    Video,
    Image,
    Audio,
    File,
    #[default]
    Other,
}

impl ContentKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Post => "post",
            Self::Video => "video",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::File => "file",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article" => Ok(Self::Article),
            "post" => Ok(Self::Post),
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "file" => Ok(Self::File),
            "other" => Ok(Self::Other),
            _ => Err(format!("invalid content kind: {s}")),
        }
    }
}

/// An item produced by an adapter (or an import) that has not been stored yet.
///
/// `retrieved_at` is assigned by the store; `language` is detected at insert
/// time when not supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewContentItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub source_id: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewContentItem {
    /// Creates an empty item of `kind` owned by `source_id`.
    #[must_use]
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            kind,
            ..Self::default()
        }
    }

    /// Returns the URL used for deduplication, if any.
    #[must_use]
    pub fn canonical_url(&self) -> Option<String> {
        self.url.as_deref().and_then(canonicalize_url)
    }
}

/// A stored content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub kind: ContentKind,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub retrieved_at: DateTime<Utc>,
    pub source_id: String,
    pub language: String,
    pub metadata: Metadata,
    pub processed: bool,
}

impl ContentItem {
    /// Sets the language and mirrors it into metadata.
    pub fn set_language(&mut self, language: impl Into<String>) {
        let language = language.into();
        self.metadata.insert(
            LANGUAGE_KEY.to_string(),
            serde_json::Value::String(language.clone()),
        );
        self.language = language;
    }

    /// Returns a string array stored under `key`, ignoring non-string entries.
    #[must_use]
    pub fn metadata_strings(&self, key: &str) -> Vec<String> {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| value.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Raw `content_items` row; converted into [`ContentItem`] after decoding.
#[derive(Debug, FromRow)]
pub(crate) struct ContentRow {
    id: String,
    title: String,
    body: String,
    kind: String,
    url: Option<String>,
    author: Option<String>,
    published_at: Option<DateTime<Utc>>,
    retrieved_at: DateTime<Utc>,
    source_id: String,
    language: String,
    metadata: String,
    processed: bool,
}

impl TryFrom<ContentRow> for ContentItem {
    type Error = StoreError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse::<ContentKind>()
            .map_err(|e| StoreError::decode("kind", e))?;
        let metadata = serde_json::from_str::<Metadata>(&row.metadata)
            .map_err(|e| StoreError::decode("metadata", e))?;
        Ok(Self {
            id: row.id,
            title: row.title,
            body: row.body,
            kind,
            url: row.url,
            author: row.author,
            published_at: row.published_at,
            retrieved_at: row.retrieved_at,
            source_id: row.source_id,
            language: row.language,
            metadata,
            processed: row.processed,
        })
    }
}

/// Normalizes a URL for deduplication.
///
/// Absolute http(s) URLs are parsed and re-serialized without their fragment
/// (lowercased host, default port dropped). Other non-empty strings are kept
/// trimmed as-is. Blank input yields `None`.
#[must_use]
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(mut url) if matches!(url.scheme(), "http" | "https") => {
            url.set_fragment(None);
            Some(url.to_string())
        }
        _ => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_round_trips_through_db_string() {
        for kind in [
            ContentKind::Article,
            ContentKind::Post,
            ContentKind::Video,
            ContentKind::Image,
            ContentKind::Audio,
            ContentKind::File,
            ContentKind::Other,
        ] {
            assert_eq!(kind.as_str().parse::<ContentKind>(), Ok(kind));
        }
        assert!("podcast".parse::<ContentKind>().is_err());
    }

    #[test]
    fn test_canonicalize_url_drops_fragment_and_lowercases_host() {
        assert_eq!(
            canonicalize_url("  https://Example.COM/a/b#section ").as_deref(),
            Some("https://example.com/a/b")
        );
        assert_eq!(
            canonicalize_url("https://example.com:443/x").as_deref(),
            Some("https://example.com/x")
        );
    }

    #[test]
    fn test_canonicalize_url_blank_and_opaque_values() {
        assert_eq!(canonicalize_url("   "), None);
        assert_eq!(
            canonicalize_url("urn:isbn:0451450523").as_deref(),
            Some("urn:isbn:0451450523")
        );
    }

    #[test]
    fn test_new_content_item_deserializes_with_defaults() {
        let item: NewContentItem = serde_json::from_str(
            r#"{"id": "manual:1", "source_id": "notes", "title": "Hello", "kind": "post"}"#,
        )
        .unwrap_or_default();
        assert_eq!(item.id, "manual:1");
        assert_eq!(item.kind, ContentKind::Post);
        assert!(item.url.is_none());
        assert!(item.metadata.is_empty());
    }

    #[test]
    fn test_set_language_mirrors_into_metadata() {
        let mut item = ContentItem {
            id: "a".to_string(),
            title: String::new(),
            body: String::new(),
            kind: ContentKind::Article,
            url: None,
            author: None,
            published_at: None,
            retrieved_at: Utc::now(),
            source_id: "s".to_string(),
            language: "simple".to_string(),
            metadata: Metadata::new(),
            processed: false,
        };
        item.set_language("english");
        assert_eq!(item.language, "english");
        assert_eq!(
            item.metadata.get(LANGUAGE_KEY).and_then(|v| v.as_str()),
            Some("english")
        );
    }
}
