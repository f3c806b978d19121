//! Source definitions: kind, polling cadence and the stored configuration.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;

use super::RegistryError;

/// Adapter-specific configuration (feed URL, channel name, headers, ...).
pub type AdapterConfig = serde_json::Map<String, serde_json::Value>;

/// Polling floor for `realtime` sources, which have no push transport here.
const REALTIME_POLL_SECS: u64 = 60;

/// Type of a configured source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rss,
    Webpage,
    FileFolder,
    Custom,
}

impl SourceKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::Webpage => "webpage",
            Self::FileFolder => "file_folder",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rss" => Ok(Self::Rss),
            "webpage" => Ok(Self::Webpage),
            "file_folder" => Ok(Self::FileFolder),
            "custom" => Ok(Self::Custom),
            _ => Err(format!(
                "invalid source kind: {s} (expected rss, webpage, file_folder or custom)"
            )),
        }
    }
}

/// How often a source is polled.
///
/// Either a named frequency band or an explicit number of seconds. `Manual`
/// sources are never polled by the scheduler, only fetched on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Cadence {
    Realtime,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    #[default]
    Hourly,
    Daily,
    Weekly,
    Manual,
    /// Explicit interval in seconds (always >= 1).
    Seconds(u64),
}

impl Cadence {
    /// Creates an explicit-seconds cadence.
    ///
    /// # Errors
    ///
    /// Returns an error message when `secs` is zero.
    pub fn every(secs: u64) -> Result<Self, String> {
        if secs == 0 {
            return Err("cadence must be at least 1 second".to_string());
        }
        Ok(Self::Seconds(secs))
    }

    /// Minimum time between two cycles, `None` for manual sources.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        let secs = match self {
            Self::Realtime => REALTIME_POLL_SECS,
            Self::FiveMinutes => 5 * 60,
            Self::FifteenMinutes => 15 * 60,
            Self::ThirtyMinutes => 30 * 60,
            Self::Hourly => 60 * 60,
            Self::Daily => 24 * 60 * 60,
            Self::Weekly => 7 * 24 * 60 * 60,
            Self::Manual => return None,
            Self::Seconds(secs) => *secs,
        };
        Some(Duration::from_secs(secs))
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Realtime => f.write_str("realtime"),
            Self::FiveMinutes => f.write_str("5min"),
            Self::FifteenMinutes => f.write_str("15min"),
            Self::ThirtyMinutes => f.write_str("30min"),
            Self::Hourly => f.write_str("hourly"),
            Self::Daily => f.write_str("daily"),
            Self::Weekly => f.write_str("weekly"),
            Self::Manual => f.write_str("manual"),
            Self::Seconds(secs) => write!(f, "{secs}s"),
        }
    }
}

impl std::str::FromStr for Cadence {
    type Err = String;

    /// Accepts band names (`hourly`, `5min`, ...) and seconds (`300` or `300s`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "realtime" => Ok(Self::Realtime),
            "5min" => Ok(Self::FiveMinutes),
            "15min" => Ok(Self::FifteenMinutes),
            "30min" => Ok(Self::ThirtyMinutes),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "manual" => Ok(Self::Manual),
            _ => {
                let digits = s.strip_suffix('s').unwrap_or(s);
                let secs = digits.parse::<u64>().map_err(|_| {
                    format!(
                        "invalid cadence: {s} (expected realtime, 5min, 15min, 30min, hourly, daily, weekly, manual or a number of seconds)"
                    )
                })?;
                Self::every(secs)
            }
        }
    }
}

impl Serialize for Cadence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Seconds(secs) => serializer.serialize_u64(*secs),
            band => serializer.collect_str(band),
        }
    }
}

impl<'de> Deserialize<'de> for Cadence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Seconds(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Seconds(secs) => Self::every(secs).map_err(D::Error::custom),
            Repr::Text(text) => text.parse().map_err(D::Error::custom),
        }
    }
}

/// A configured source as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub adapter_id: String,
    pub cadence: Cadence,
    pub config: AdapterConfig,
    pub tags: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_retrieved: Option<DateTime<Utc>>,
}

impl SourceConfig {
    /// Returns how long until the next cycle is due, or `None` when the source
    /// is never polled (manual cadence). Zero means due now.
    #[must_use]
    pub fn time_until_due(&self, now: DateTime<Utc>) -> Option<Duration> {
        let interval = self.cadence.interval()?;
        let Some(last) = self.last_retrieved else {
            return Some(Duration::ZERO);
        };
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        Some(interval.saturating_sub(elapsed))
    }
}

/// Input for [`super::SourceRegistry::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    /// Explicit id; derived from the name when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub kind: SourceKind,
    pub adapter_id: String,
    #[serde(default)]
    pub cadence: Cadence,
    #[serde(default)]
    pub config: AdapterConfig,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewSource {
    /// Creates an enabled, hourly source with an empty adapter config.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SourceKind, adapter_id: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            adapter_id: adapter_id.into(),
            cadence: Cadence::default(),
            config: AdapterConfig::new(),
            tags: Vec::new(),
            enabled: true,
        }
    }
}

/// Partial update for [`super::SourceRegistry::update`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub kind: Option<SourceKind>,
    pub adapter_id: Option<String>,
    pub cadence: Option<Cadence>,
    pub config: Option<AdapterConfig>,
    pub tags: Option<Vec<String>>,
    pub enabled: Option<bool>,
}

impl SourceUpdate {
    /// Returns `true` when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn apply(self, source: &mut SourceConfig) {
        if let Some(name) = self.name {
            source.name = name;
        }
        if let Some(kind) = self.kind {
            source.kind = kind;
        }
        if let Some(adapter_id) = self.adapter_id {
            source.adapter_id = adapter_id;
        }
        if let Some(cadence) = self.cadence {
            source.cadence = cadence;
        }
        if let Some(config) = self.config {
            source.config = config;
        }
        if let Some(tags) = self.tags {
            source.tags = tags;
        }
        if let Some(enabled) = self.enabled {
            source.enabled = enabled;
        }
    }
}

/// Derives a source id from its display name: `"My Feed"` -> `"my-feed-1a2b3c4d"`.
#[must_use]
pub fn derive_source_id(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "source" } else { slug };

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{slug}-{}", &suffix[..8])
}

/// Raw `sources` row; converted into [`SourceConfig`] after decoding.
#[derive(Debug, FromRow)]
pub(crate) struct SourceRow {
    id: String,
    name: String,
    kind: String,
    adapter_id: String,
    cadence: String,
    config: String,
    tags: String,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_retrieved: Option<DateTime<Utc>>,
}

impl TryFrom<SourceRow> for SourceConfig {
    type Error = RegistryError;

    fn try_from(row: SourceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: row
                .kind
                .parse()
                .map_err(|e| RegistryError::decode("kind", e))?,
            cadence: row
                .cadence
                .parse()
                .map_err(|e| RegistryError::decode("cadence", e))?,
            config: serde_json::from_str(&row.config)
                .map_err(|e| RegistryError::decode("config", e))?,
            tags: serde_json::from_str(&row.tags).map_err(|e| RegistryError::decode("tags", e))?,
            id: row.id,
            name: row.name,
            adapter_id: row.adapter_id,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_retrieved: row.last_retrieved,
        })
    }
}
