//! Stable content item ids.

use sha2::{Digest, Sha256};

/// Hex characters of the digest kept in an id (128 bits).
const DIGEST_HEX_LEN: usize = 32;

/// Builds `"{source_id}:{hash}"` from the entry's own identifier (guid, link,
/// message id), so re-fetching the same entry yields the same id. Entries
/// without an identifier get a random id.
#[must_use]
pub fn stable_item_id(source_id: &str, entry_key: Option<&str>) -> String {
    match entry_key.map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) => {
            let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
            format!("{source_id}:{}", &digest[..DIGEST_HEX_LEN])
        }
        None => format!("{source_id}:{}", uuid::Uuid::new_v4().simple()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_id() {
        let a = stable_item_id("feed-1", Some("https://example.com/a"));
        let b = stable_item_id("feed-1", Some(" https://example.com/a "));
        assert_eq!(a, b);
        assert!(a.starts_with("feed-1:"));
        assert_eq!(a.len(), "feed-1:".len() + DIGEST_HEX_LEN);
    }

    #[test]
    fn test_id_is_scoped_by_source() {
        assert_ne!(
            stable_item_id("feed-1", Some("guid-1")),
            stable_item_id("feed-2", Some("guid-1"))
        );
    }

    #[test]
    fn test_missing_key_is_random() {
        assert_ne!(stable_item_id("feed-1", None), stable_item_id("feed-1", Some("")));
        assert_ne!(stable_item_id("feed-1", None), stable_item_id("feed-1", None));
    }
}
