//! Farcaster adapter backed by the Neynar v2 API

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderName;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use credit_core::{FarcasterActivity, Source};

use super::{ActivitySource, HttpSource, count, required_str, timestamp, until_cancelled};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::fetch::{DataKind, FetchCache, FetchOptions, cache_key};
use crate::{Error, Result};

/// Neynar API
pub const DEFAULT_BASE_URL: &str = "https://api.neynar.com";

/// Casts requested per feed page
const FEED_LIMIT: u32 = 150;

/// Profile fields the record needs
#[derive(Debug, Clone, PartialEq)]
pub struct FarcasterUser {
    /// Farcaster id
    pub fid: u64,
    /// Username
    pub username: String,
    /// Followers
    pub followers: u32,
    /// Following
    pub following: u32,
    /// Power badge
    pub power_badge: bool,
    /// Verified Ethereum addresses, lowercase
    pub verified_addresses: Vec<String>,
}

/// One cast from the user's feed
#[derive(Debug, Clone, PartialEq)]
pub struct Cast {
    /// Publication time
    pub timestamp: DateTime<Utc>,
    /// Reply to another cast
    pub is_reply: bool,
    /// Likes received
    pub likes: u32,
    /// Recasts received
    pub recasts: u32,
}

/// Farcaster adapter
pub struct FarcasterSource {
    http: Arc<HttpSource>,
    cache: FetchCache,
    user: FetchOptions<FarcasterUser>,
    casts: FetchOptions<Vec<Cast>>,
}

impl FarcasterSource {
    /// Create the adapter; Neynar requires an API key
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no API key is configured, or an error if
    /// the HTTP client cannot be built.
    pub fn new(config: &SourceConfig, cache: FetchCache) -> Result<Self> {
        let key = config
            .resolve_api_key()
            .ok_or_else(|| Error::Config("sources.farcaster.api_key is required".into()))?;
        let http = HttpSource::new("farcaster", config, DEFAULT_BASE_URL, cache.config().timeout)?
            .with_header(HeaderName::from_static("x-api-key"), &key)?;
        Ok(Self::with_http(Arc::new(http), cache))
    }

    /// Create the adapter on top of an existing client
    #[must_use]
    pub fn with_http(http: Arc<HttpSource>, cache: FetchCache) -> Self {
        Self {
            http,
            cache,
            user: FetchOptions::with_transform(DataKind::Profile, |v| parse_user(&v)),
            casts: FetchOptions::with_transform(DataKind::SocialActivity, |v| parse_casts(&v)),
        }
    }

    async fn load(&self, username: &str) -> std::result::Result<FarcasterActivity, FetchError> {
        let user = self
            .http
            .get_cached(
                &self.cache,
                &cache_key("farcaster", username, "user"),
                "/v2/farcaster/user/by_username".to_string(),
                vec![("username", username.to_string())],
                &self.user,
            )
            .await?;

        let casts = self
            .http
            .get_cached(
                &self.cache,
                &cache_key("farcaster", &user.fid.to_string(), "casts"),
                "/v2/farcaster/feed/user/casts".to_string(),
                vec![
                    ("fid", user.fid.to_string()),
                    ("limit", FEED_LIMIT.to_string()),
                    ("include_replies", "true".to_string()),
                ],
                &self.casts,
            )
            .await?;

        Ok(assemble(user, &casts, Utc::now()))
    }
}

#[async_trait]
impl ActivitySource for FarcasterSource {
    type Record = FarcasterActivity;

    fn source(&self) -> Source {
        Source::Farcaster
    }

    async fn fetch_activity(
        &self,
        identity: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<FarcasterActivity, FetchError> {
        let username = identity.trim().trim_start_matches('@').to_lowercase();
        if username.is_empty() {
            return Err(FetchError::validation("empty Farcaster username"));
        }
        until_cancelled(&cancel, self.load(&username)).await
    }
}

/// Parse `GET /v2/farcaster/user/by_username`
///
/// # Errors
///
/// Returns [`FetchError::Validation`] if the user object, fid or username is missing.
pub fn parse_user(data: &Value) -> std::result::Result<FarcasterUser, FetchError> {
    let user = &data["user"];
    if !user.is_object() {
        return Err(FetchError::validation("missing field `user`"));
    }
    let fid = user["fid"]
        .as_u64()
        .ok_or_else(|| FetchError::validation("missing field `fid`"))?;

    let mut verified_addresses: Vec<String> = user["verified_addresses"]["eth_addresses"]
        .as_array()
        .map(|addrs| {
            addrs
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default();
    verified_addresses.dedup();

    Ok(FarcasterUser {
        fid,
        username: required_str(user, "username")?,
        followers: count(&user["follower_count"]),
        following: count(&user["following_count"]),
        power_badge: user["power_badge"].as_bool().unwrap_or(false),
        verified_addresses,
    })
}

/// Parse `GET /v2/farcaster/feed/user/casts`
///
/// # Errors
///
/// Returns [`FetchError::Validation`] if `casts` is missing.
pub fn parse_casts(data: &Value) -> std::result::Result<Vec<Cast>, FetchError> {
    let casts = data["casts"]
        .as_array()
        .ok_or_else(|| FetchError::validation("missing field `casts`"))?;

    Ok(casts
        .iter()
        .filter_map(|cast| {
            Some(Cast {
                timestamp: timestamp(&cast["timestamp"])?,
                is_reply: !cast["parent_hash"].is_null(),
                likes: count(&cast["reactions"]["likes_count"]),
                recasts: count(&cast["reactions"]["recasts_count"]),
            })
        })
        .collect())
}

fn assemble(user: FarcasterUser, casts: &[Cast], fetched_at: DateTime<Utc>) -> FarcasterActivity {
    let recent: Vec<&Cast> = casts
        .iter()
        .filter(|c| {
            let age = fetched_at - c.timestamp;
            age >= chrono::Duration::zero() && age < chrono::Duration::days(30)
        })
        .collect();

    let sum = |f: fn(&Cast) -> u32| recent.iter().fold(0u32, |acc, c| acc.saturating_add(f(*c)));
    let replies = recent.iter().filter(|c| c.is_reply).count();

    FarcasterActivity {
        fid: user.fid,
        username: user.username,
        followers: user.followers,
        following: user.following,
        casts_last_30d: u32::try_from(recent.len() - replies).unwrap_or(u32::MAX),
        replies_last_30d: u32::try_from(replies).unwrap_or(u32::MAX),
        likes_received: sum(|c| c.likes),
        recasts_received: sum(|c| c.recasts),
        power_badge: user.power_badge,
        verified_addresses: user.verified_addresses,
        fetched_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_user() {
        let data = json!({
            "user": {
                "object": "user",
                "fid": 3,
                "username": "dwr.eth",
                "follower_count": 450000,
                "following_count": 2700,
                "power_badge": true,
                "verified_addresses": {
                    "eth_addresses": ["0xD7029BDEa1c17493893AAfE29AAD69EF892B8ff2"],
                    "sol_addresses": []
                }
            }
        });
        let user = parse_user(&data).unwrap();
        assert_eq!(user.fid, 3);
        assert_eq!(user.username, "dwr.eth");
        assert!(user.power_badge);
        assert_eq!(
            user.verified_addresses,
            vec!["0xd7029bdea1c17493893aafe29aad69ef892b8ff2".to_string()]
        );
    }

    #[test]
    fn test_parse_user_missing() {
        assert!(matches!(
            parse_user(&json!({"message": "User not found"})),
            Err(FetchError::Validation(_))
        ));
    }

    #[test]
    fn test_assemble_counts_recent_casts() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let data = json!({
            "casts": [
                {"timestamp": "2026-05-31T10:00:00Z", "parent_hash": null,
                 "reactions": {"likes_count": 10, "recasts_count": 2}},
                {"timestamp": "2026-05-20T10:00:00Z", "parent_hash": "0xabc",
                 "reactions": {"likes_count": 1, "recasts_count": 0}},
                {"timestamp": "2026-03-01T10:00:00Z", "parent_hash": null,
                 "reactions": {"likes_count": 99, "recasts_count": 9}}
            ],
            "next": {"cursor": null}
        });
        let casts = parse_casts(&data).unwrap();
        let user = FarcasterUser {
            fid: 7,
            username: "alice".into(),
            followers: 10,
            following: 5,
            power_badge: false,
            verified_addresses: Vec::new(),
        };
        let record = assemble(user, &casts, now);
        assert_eq!(record.casts_last_30d, 1);
        assert_eq!(record.replies_last_30d, 1);
        assert_eq!(record.likes_received, 11);
        assert_eq!(record.recasts_received, 2);
    }
}
