//! Shared User-Agent string for adapter HTTP clients.
//!
//! Feed hosts see one consistent identity regardless of which adapter polls
//! them (RFC 9308).

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/digest-hub";

/// Default User-Agent for adapter requests.
#[must_use]
pub(crate) fn default_fetch_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("digest-hub/{version} (content-aggregator; +{PROJECT_UA_URL})")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version_and_project_url() {
        let ua = default_fetch_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL: {ua}");
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("digest-hub/")
                .and_then(|s| s.split(' ').next())
                .unwrap(),
        );
    }
}
