//! Lens Protocol adapter (GraphQL API)

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use credit_core::{LensActivity, Source};

use super::{ActivitySource, HttpSource, count, timestamp, until_cancelled};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::fetch::{DataKind, FetchCache, FetchOptions, cache_key};
use crate::Result;

/// Public Lens API
pub const DEFAULT_BASE_URL: &str = "https://api-v2.lens.dev";

const PROFILE_QUERY: &str = r"query Profile($handle: Handle!) {
  profile(request: { forHandle: $handle }) {
    id
    createdAt
    handle { fullHandle }
    ownedBy { address }
    stats { followers following posts comments mirrors reactions countOpenActions }
  }
}";

/// Lens adapter
pub struct LensSource {
    http: Arc<HttpSource>,
    cache: FetchCache,
    profile: FetchOptions<LensActivity>,
}

impl LensSource {
    /// Create the adapter; the public API needs no credentials
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SourceConfig, cache: FetchCache) -> Result<Self> {
        let http = HttpSource::new("lens", config, DEFAULT_BASE_URL, cache.config().timeout)?;
        Ok(Self::with_http(Arc::new(http), cache))
    }

    /// Create the adapter on top of an existing client
    #[must_use]
    pub fn with_http(http: Arc<HttpSource>, cache: FetchCache) -> Self {
        Self {
            http,
            cache,
            profile: FetchOptions::with_transform(DataKind::SocialActivity, |v| parse_profile(&v)),
        }
    }
}

#[async_trait]
impl ActivitySource for LensSource {
    type Record = LensActivity;

    fn source(&self) -> Source {
        Source::Lens
    }

    async fn fetch_activity(
        &self,
        identity: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<LensActivity, FetchError> {
        let handle = full_handle(identity)?;
        let body = json!({
            "query": PROFILE_QUERY,
            "variables": { "handle": handle },
        });
        let mut record = until_cancelled(
            &cancel,
            self.http.post_cached(
                &self.cache,
                &cache_key("lens", &handle, "profile"),
                String::new(),
                body,
                &self.profile,
            ),
        )
        .await?;
        // the cached record keeps the time of its first fetch
        record.fetched_at = Utc::now();
        Ok(record)
    }
}

/// `alice`, `@alice`, `alice.lens` and `lens/alice` all become `lens/alice`
///
/// # Errors
///
/// Returns [`FetchError::Validation`] for an empty handle.
pub fn full_handle(identity: &str) -> std::result::Result<String, FetchError> {
    let trimmed = identity.trim().trim_start_matches('@').to_lowercase();
    let local = trimmed
        .strip_prefix("lens/")
        .or_else(|| trimmed.strip_suffix(".lens"))
        .unwrap_or(&trimmed);
    if local.is_empty() || local.contains('/') {
        return Err(FetchError::validation(format!("invalid Lens handle {identity:?}")));
    }
    Ok(format!("lens/{local}"))
}

/// Parse the `Profile` query response.
///
/// `fetched_at` is stamped with the parse time.
///
/// # Errors
///
/// Returns [`FetchError::NotFound`] for a null profile and
/// [`FetchError::Validation`] for GraphQL errors or missing fields.
pub fn parse_profile(data: &Value) -> std::result::Result<LensActivity, FetchError> {
    if let Some(errors) = data["errors"].as_array().filter(|e| !e.is_empty()) {
        return Err(FetchError::Validation(
            errors
                .iter()
                .map(|e| e["message"].as_str().unwrap_or("unknown GraphQL error").to_string())
                .collect(),
        ));
    }

    let profile = &data["data"]["profile"];
    if profile.is_null() {
        return Err(FetchError::NotFound("Lens profile does not exist".into()));
    }

    let stats = &profile["stats"];
    Ok(LensActivity {
        handle: profile["handle"]["fullHandle"]
            .as_str()
            .ok_or_else(|| FetchError::validation("missing field `handle.fullHandle`"))?
            .to_string(),
        owned_by: profile["ownedBy"]["address"]
            .as_str()
            .unwrap_or_default()
            .to_lowercase(),
        followers: count(&stats["followers"]),
        following: count(&stats["following"]),
        posts: count(&stats["posts"]),
        comments: count(&stats["comments"]),
        mirrors: count(&stats["mirrors"]),
        reactions_received: count(&stats["reactions"]),
        collects_received: count(&stats["countOpenActions"]),
        created_at: timestamp(&profile["createdAt"])
            .ok_or_else(|| FetchError::validation("missing field `createdAt`"))?,
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_handle() {
        assert_eq!(full_handle("Alice").unwrap(), "lens/alice");
        assert_eq!(full_handle("@alice").unwrap(), "lens/alice");
        assert_eq!(full_handle("alice.lens").unwrap(), "lens/alice");
        assert_eq!(full_handle("lens/alice").unwrap(), "lens/alice");
        assert!(full_handle("  ").is_err());
        assert!(full_handle("other/alice").is_err());
    }

    #[test]
    fn test_parse_profile() {
        let data = json!({
            "data": {
                "profile": {
                    "id": "0x01",
                    "createdAt": "2023-11-01T00:00:00.000Z",
                    "handle": {"fullHandle": "lens/stani"},
                    "ownedBy": {"address": "0x7241DDDec3A6aF367882eAF9651b87E1C7549Dff"},
                    "stats": {
                        "followers": 120000,
                        "following": 300,
                        "posts": 800,
                        "comments": 400,
                        "mirrors": 150,
                        "reactions": 9000,
                        "countOpenActions": 250
                    }
                }
            }
        });
        let record = parse_profile(&data).unwrap();
        assert_eq!(record.handle, "lens/stani");
        assert_eq!(record.owned_by, "0x7241dddec3a6af367882eaf9651b87e1c7549dff");
        assert_eq!(record.posts, 800);
        assert_eq!(record.collects_received, 250);
    }

    #[test]
    fn test_null_profile_is_not_found() {
        let data = json!({"data": {"profile": null}});
        assert!(matches!(parse_profile(&data), Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_graphql_errors_are_validation() {
        let data = json!({"errors": [{"message": "Handle is invalid"}], "data": null});
        assert_eq!(
            parse_profile(&data),
            Err(FetchError::Validation(vec!["Handle is invalid".into()]))
        );
    }
}
