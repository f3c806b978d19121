//! Typed accessors over an adapter's JSON config map.
//!
//! Values set from the command line arrive as strings, so numeric keys accept
//! both JSON numbers and numeric strings.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use url::Url;

use crate::source::AdapterConfig;

use super::AdapterError;

/// Default per-request timeout for adapter HTTP calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Reads config values on behalf of one adapter, producing
/// [`AdapterError::Config`] errors that name it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConfigReader<'a> {
    adapter: &'static str,
    config: &'a AdapterConfig,
}

impl<'a> ConfigReader<'a> {
    pub(crate) fn new(adapter: &'static str, config: &'a AdapterConfig) -> Self {
        Self { adapter, config }
    }

    pub(crate) fn optional_str(&self, key: &str) -> Result<Option<String>, AdapterError> {
        match self.config.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.trim().to_string())),
            Some(other) => Err(AdapterError::invalid_value(
                self.adapter,
                key,
                &format!("expected a string, got {other}"),
            )),
        }
    }

    pub(crate) fn required_str(&self, key: &str) -> Result<String, AdapterError> {
        self.optional_str(key)?
            .ok_or_else(|| AdapterError::missing_key(self.adapter, key))
    }

    pub(crate) fn optional_positive_u64(&self, key: &str) -> Result<Option<u64>, AdapterError> {
        let parsed = match self.config.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(number)) => number.as_u64(),
            Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
            Some(_) => None,
        };
        match parsed {
            Some(value) if value > 0 => Ok(Some(value)),
            _ => Err(AdapterError::invalid_value(
                self.adapter,
                key,
                "expected a positive integer",
            )),
        }
    }

    pub(crate) fn required_positive_u64(&self, key: &str) -> Result<u64, AdapterError> {
        self.optional_positive_u64(key)?
            .ok_or_else(|| AdapterError::missing_key(self.adapter, key))
    }

    /// Request timeout from `timeout` (seconds), defaulting to 30s.
    pub(crate) fn timeout(&self) -> Result<Duration, AdapterError> {
        let secs = self
            .optional_positive_u64("timeout")?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Ok(Duration::from_secs(secs))
    }

    /// Absolute http(s) URL stored under `key`.
    pub(crate) fn http_url(&self, key: &str) -> Result<Url, AdapterError> {
        let raw = self.required_str(key)?;
        let url = Url::parse(&raw)
            .map_err(|e| AdapterError::invalid_value(self.adapter, key, &format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AdapterError::invalid_value(
                self.adapter,
                key,
                &format!("{raw}: only http and https URLs are supported"),
            ));
        }
        Ok(url)
    }

    /// Extra request headers from an optional string map under `key`.
    pub(crate) fn headers(&self, key: &str) -> Result<HeaderMap, AdapterError> {
        let mut headers = HeaderMap::new();
        let entries = match self.config.get(key) {
            None | Some(Value::Null) => return Ok(headers),
            Some(Value::Object(entries)) => entries,
            Some(_) => {
                return Err(AdapterError::invalid_value(
                    self.adapter,
                    key,
                    "expected a map of header names to values",
                ));
            }
        };

        for (name, value) in entries {
            let Some(value) = value.as_str() else {
                return Err(AdapterError::invalid_value(
                    self.adapter,
                    key,
                    &format!("header `{name}` must be a string"),
                ));
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                AdapterError::invalid_value(self.adapter, key, &format!("`{name}`: {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                AdapterError::invalid_value(self.adapter, key, &format!("`{name}`: {e}"))
            })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}
