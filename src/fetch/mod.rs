//! Resilient fetch layer: TTL cache, request coalescing, retries and timeouts

mod cache;
mod options;

pub use cache::{CacheStatsSnapshot, FetchCache};
pub use options::{DataKind, FetchOptions, Transform, ValidationReport, Validator};

/// Cache key `{source}:{identity}:{kind}`; identities are case-insensitive
#[must_use]
pub fn cache_key(source: &str, identity: &str, kind: &str) -> String {
    format!("{source}:{}:{kind}", identity.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_normalizes_identity() {
        assert_eq!(cache_key("github", " Alice ", "profile"), "github:alice:profile");
        assert_eq!(
            cache_key("onchain", "0xABCdef", "txlist"),
            cache_key("onchain", "0xabcDEF", "txlist")
        );
    }
}
