//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use digest_hub::db::DatabaseOptions;
use digest_hub::scheduler::{DEFAULT_CHECK_INTERVAL, DEFAULT_COOLDOWN, SchedulerTiming};
use digest_hub::search::{DEFAULT_SIMILARITY_THRESHOLD, SearchWeights};
use serde::Deserialize;

const APP_DIR: &str = "digest-hub";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "digest-hub.db";

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// `SQLite` database file.
    pub database_path: Option<PathBuf>,
    /// Database pool max connections (1..=20).
    pub db_max_connections: Option<u32>,
    /// Database busy timeout in milliseconds.
    pub db_busy_timeout_ms: Option<u64>,
    /// Longest pause between two due-checks of a source loop.
    pub check_interval_secs: Option<u64>,
    /// Pause after a failed fetch cycle.
    pub cooldown_secs: Option<u64>,
    /// Default trigram similarity threshold for search.
    pub similarity_threshold: Option<f64>,
    /// Weight of the full-text rank in hybrid search.
    pub lexical_weight: Option<f64>,
    /// Weight of the trigram similarity in hybrid search.
    pub fuzzy_weight: Option<f64>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(value) = self.db_max_connections
            && !(1..=20).contains(&value)
        {
            bail!("Invalid config value for `db_max_connections`: {value}. Expected range: 1..=20");
        }
        if let Some(value) = self.db_busy_timeout_ms
            && value > 120_000
        {
            bail!("Invalid config value for `db_busy_timeout_ms`: {value}. Expected range: 0..=120000");
        }
        validate_interval_secs("check_interval_secs", self.check_interval_secs)?;
        validate_interval_secs("cooldown_secs", self.cooldown_secs)?;
        if let Some(value) = self.similarity_threshold
            && !(0.0..=1.0).contains(&value)
        {
            bail!(
                "Invalid config value for `similarity_threshold`: {value}. Expected range: 0.0..=1.0"
            );
        }
        if self.lexical_weight.is_some() || self.fuzzy_weight.is_some() {
            let weights = self.search_weights();
            if weights.validate().is_err() {
                bail!(
                    "Invalid config values for `lexical_weight`/`fuzzy_weight`: {}/{}. Each must be in 0.0..=1.0 and they must sum to 1.0",
                    weights.lexical,
                    weights.fuzzy
                );
            }
        }
        Ok(())
    }

    /// Blend weights; a single configured weight implies the other.
    #[must_use]
    pub fn search_weights(&self) -> SearchWeights {
        match (self.lexical_weight, self.fuzzy_weight) {
            (Some(lexical), Some(fuzzy)) => SearchWeights { lexical, fuzzy },
            (Some(lexical), None) => SearchWeights {
                lexical,
                fuzzy: 1.0 - lexical,
            },
            (None, Some(fuzzy)) => SearchWeights {
                lexical: 1.0 - fuzzy,
                fuzzy,
            },
            (None, None) => SearchWeights::default(),
        }
    }
}

fn validate_interval_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

impl LoadedConfig {
    /// Whether configuration was read from disk.
    #[must_use]
    pub fn loaded_from_file(&self) -> bool {
        self.config.is_some()
    }
}

/// Effective settings after applying file config and defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub db_options: DatabaseOptions,
    pub timing: SchedulerTiming,
    pub similarity_threshold: f64,
    pub weights: SearchWeights,
}

impl Settings {
    /// Resolves settings; `database_override` (from `--db`) wins over the file.
    #[must_use]
    pub fn resolve(file_config: Option<&FileConfig>, database_override: Option<PathBuf>) -> Self {
        let defaults = FileConfig::default();
        let file_config = file_config.unwrap_or(&defaults);

        let mut db_options = DatabaseOptions::default();
        if let Some(n) = file_config.db_max_connections {
            db_options.max_connections = n;
        }
        if let Some(ms) = file_config.db_busy_timeout_ms {
            db_options.busy_timeout_ms = ms;
        }

        let timing = SchedulerTiming {
            check_interval: file_config
                .check_interval_secs
                .map_or(DEFAULT_CHECK_INTERVAL, Duration::from_secs),
            cooldown: file_config
                .cooldown_secs
                .map_or(DEFAULT_COOLDOWN, Duration::from_secs),
        };

        let database_path = database_override
            .or_else(|| file_config.database_path.clone())
            .unwrap_or_else(default_database_path);

        Self {
            database_path,
            db_options,
            timing,
            similarity_threshold: file_config
                .similarity_threshold
                .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
            weights: file_config.search_weights(),
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/digest-hub/config.toml`
/// 2. `$HOME/.config/digest-hub/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join(CONFIG_FILE));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

/// Default database location.
///
/// Priority:
/// 1. `$XDG_DATA_HOME/digest-hub/digest-hub.db`
/// 2. `$HOME/.local/share/digest-hub/digest-hub.db`
/// 3. `./digest-hub.db`
#[must_use]
pub fn default_database_path() -> PathBuf {
    if let Some(xdg_data_home) = env_var_non_empty_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data_home).join(APP_DIR).join(DATABASE_FILE);
    }
    match env_var_non_empty_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR)
            .join(DATABASE_FILE),
        None => PathBuf::from(DATABASE_FILE),
    }
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` (must exist) or from the default path if present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let cfg = parse_config_str(
            r#"
            # comment
            database_path = "/tmp/hub.db"
            db_max_connections = 4
            db_busy_timeout_ms = 2000
            check_interval_secs = 10
            cooldown_secs = 120
            similarity_threshold = 0.25
            lexical_weight = 0.5
            fuzzy_weight = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.database_path, Some(PathBuf::from("/tmp/hub.db")));
        assert_eq!(cfg.db_max_connections, Some(4));

        let settings = Settings::resolve(Some(&cfg), None);
        assert_eq!(settings.timing.check_interval, Duration::from_secs(10));
        assert_eq!(settings.timing.cooldown, Duration::from_secs(120));
        assert_eq!(settings.db_options.busy_timeout_ms, 2000);
        assert!((settings.similarity_threshold - 0.25).abs() < f64::EPSILON);
        assert!((settings.weights.lexical - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse_config_str("concurrency = 4").unwrap_err();
        assert!(err.to_string().contains("unknown field"), "got: {err}");
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let err = parse_config_str("db_max_connections = 0").unwrap_err();
        assert!(err.to_string().contains("`db_max_connections`"));

        let err = parse_config_str("cooldown_secs = 0").unwrap_err();
        assert!(err.to_string().contains("`cooldown_secs`"));

        let err = parse_config_str("similarity_threshold = 1.5").unwrap_err();
        assert!(err.to_string().contains("`similarity_threshold`"));

        let err = parse_config_str("lexical_weight = 0.7\nfuzzy_weight = 0.7").unwrap_err();
        assert!(err.to_string().contains("lexical_weight"));
    }

    #[test]
    fn test_single_weight_implies_other() {
        let cfg = parse_config_str("lexical_weight = 0.3").unwrap();
        let weights = cfg.search_weights();
        assert!((weights.fuzzy - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::resolve(None, Some(PathBuf::from("x.db")));
        assert_eq!(settings.database_path, PathBuf::from("x.db"));
        assert_eq!(settings.timing, SchedulerTiming::default());
        assert_eq!(settings.weights, SearchWeights::default());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "cooldown_secs = 5\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.loaded_from_file());
        assert_eq!(loaded.config.unwrap().cooldown_secs, Some(5));

        let missing = dir.path().join("missing.toml");
        assert!(load_config(Some(&missing)).is_err());
    }
}
