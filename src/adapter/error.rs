//! Error types for fetch adapters.
//!
//! Structured errors following the What/Why/Fix pattern used across the
//! project.

use thiserror::Error;

/// Errors raised while constructing or running a fetch adapter.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Adapter configuration is missing a key or carries a malformed value.
    #[error("invalid config for adapter '{adapter}': {reason}\n  Suggestion: {suggestion}")]
    Config {
        /// Adapter id whose construction failed
        adapter: String,
        /// What is wrong with the config
        reason: String,
        /// How to fix the config
        suggestion: String,
    },

    /// The remote endpoint could not be reached (DNS, TLS, timeout, refused).
    #[error("could not reach '{target}': {reason}\n  Suggestion: Check network access and the configured address")]
    Connectivity {
        /// URL or channel that was contacted
        target: String,
        /// Underlying transport failure
        reason: String,
    },

    /// The remote answered, but not with something the adapter understands.
    #[error("unexpected response from '{target}': {reason}")]
    Protocol {
        /// URL or channel that was contacted
        target: String,
        /// What was wrong with the response
        reason: String,
    },

    /// No adapter is registered under the requested id.
    #[error("no adapter registered as '{adapter}'\n  Suggestion: {suggestion}")]
    UnknownAdapter {
        /// Requested adapter id
        adapter: String,
        /// Closest registered id, or the full list
        suggestion: String,
    },

    /// An adapter with this id is already registered.
    #[error("adapter '{0}' is already registered")]
    DuplicateAdapter(String),
}

impl AdapterError {
    /// Creates a `Config` error for a required key that is absent.
    #[must_use]
    pub fn missing_key(adapter: &str, key: &str) -> Self {
        Self::Config {
            adapter: adapter.to_string(),
            reason: format!("missing required key `{key}`"),
            suggestion: format!("Add `{key}` to the source config"),
        }
    }

    /// Creates a `Config` error for a key whose value is unusable.
    #[must_use]
    pub fn invalid_value(adapter: &str, key: &str, detail: &str) -> Self {
        Self::Config {
            adapter: adapter.to_string(),
            reason: format!("invalid value for `{key}`: {detail}"),
            suggestion: format!("Fix `{key}` in the source config"),
        }
    }

    /// Creates a `Connectivity` error.
    #[must_use]
    pub fn connectivity(target: &str, reason: impl std::fmt::Display) -> Self {
        Self::Connectivity {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `Protocol` error.
    #[must_use]
    pub fn protocol(target: &str, reason: impl std::fmt::Display) -> Self {
        Self::Protocol {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Maps a reqwest failure: transport problems are connectivity errors,
    /// everything else (bad status, undecodable body) is protocol.
    #[must_use]
    pub fn from_reqwest(target: &str, error: &reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_request() {
            Self::connectivity(target, error)
        } else {
            Self::protocol(target, error)
        }
    }

    /// Returns `true` for failures worth retrying after a cooldown.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Protocol { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_message() {
        let msg = AdapterError::missing_key("rss", "url").to_string();
        assert!(msg.contains("adapter 'rss'"));
        assert!(msg.contains("missing required key `url`"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AdapterError::connectivity("https://x", "timed out").is_transient());
        assert!(AdapterError::protocol("https://x", "HTTP 503").is_transient());
        assert!(!AdapterError::missing_key("rss", "url").is_transient());
        assert!(!AdapterError::DuplicateAdapter("rss".to_string()).is_transient());
    }
}
