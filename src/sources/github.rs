//! GitHub REST API adapter

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use credit_core::{GithubActivity, PullRequestSummary, RepositorySummary, Source};

use super::{ActivitySource, HttpSource, count, required_str, timestamp, until_cancelled};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::fetch::{DataKind, FetchCache, FetchOptions, ValidationReport, cache_key};
use crate::Result;

/// Public GitHub API
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Repositories inspected for health signals, most recently pushed first
const MAX_REPOSITORIES: usize = 10;

/// Authored pull requests inspected for quality signals
const MAX_PULL_REQUESTS: usize = 30;

/// Weeks covered by the commit histogram
const WEEKS: usize = 13;

/// Profile fields the record needs
#[derive(Debug, Clone, PartialEq)]
pub struct GithubProfile {
    /// Login, in the case GitHub reports it
    pub login: String,
    /// Account creation time
    pub created_at: DateTime<Utc>,
    /// Public repositories
    pub public_repos: u32,
    /// Public gists
    pub public_gists: u32,
    /// Followers
    pub followers: u32,
    /// Following
    pub following: u32,
}

/// Kind of a public event that counts as a contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Commits pushed
    Push,
    /// Pull request opened
    PullRequestOpened,
    /// Issue opened
    IssueOpened,
    /// Pull request reviewed
    Review,
}

/// One contribution event from the public event feed
#[derive(Debug, Clone, PartialEq)]
pub struct GithubEvent {
    /// Event kind
    pub kind: EventKind,
    /// Commits carried by a push; zero otherwise
    pub commits: u32,
    /// Event time
    pub created_at: DateTime<Utc>,
}

/// Issue counters from the search API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct IssueCounts {
    opened: u32,
    closed: u32,
}

/// GitHub adapter
pub struct GithubSource {
    http: Arc<HttpSource>,
    cache: FetchCache,
    profile: FetchOptions<GithubProfile>,
    repositories: FetchOptions<Vec<RepositorySummary>>,
    readme: FetchOptions<bool>,
    events: FetchOptions<Vec<GithubEvent>>,
    issue_total: FetchOptions<u32>,
    pull_requests: FetchOptions<Vec<PullRequestSummary>>,
    organizations: FetchOptions<u32>,
}

impl GithubSource {
    /// Create the adapter; `api_key` becomes a bearer token when present
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the token is not
    /// a valid header value.
    pub fn new(config: &SourceConfig, cache: FetchCache) -> Result<Self> {
        let mut http = HttpSource::new("github", config, DEFAULT_BASE_URL, cache.config().timeout)?
            .with_header(ACCEPT, "application/vnd.github+json")?;
        if let Some(token) = config.resolve_api_key() {
            http = http.with_header(AUTHORIZATION, &format!("Bearer {token}"))?;
        }
        Ok(Self::with_http(Arc::new(http), cache))
    }

    /// Create the adapter on top of an existing client
    #[must_use]
    pub fn with_http(http: Arc<HttpSource>, cache: FetchCache) -> Self {
        Self {
            http,
            cache,
            profile: FetchOptions::with_transform(DataKind::Profile, |v| parse_profile(&v))
                .validate(|p: &GithubProfile| {
                    let mut errors = Vec::new();
                    if p.created_at > Utc::now() {
                        errors.push("account creation time is in the future".to_string());
                    }
                    ValidationReport::from_errors(errors)
                }),
            repositories: FetchOptions::with_transform(DataKind::RepoMetadata, |v| {
                parse_repositories(&v)
            }),
            readme: FetchOptions::new(DataKind::RepoMetadata),
            events: FetchOptions::with_transform(DataKind::Generic, |v| parse_events(&v)),
            issue_total: FetchOptions::with_transform(DataKind::IssueList, |v| {
                v.get("total_count")
                    .map(count)
                    .ok_or_else(|| FetchError::validation("missing field `total_count`"))
            }),
            pull_requests: FetchOptions::with_transform(DataKind::IssueList, |v| {
                parse_pull_requests(&v)
            }),
            organizations: FetchOptions::with_transform(DataKind::Profile, |v| {
                v.as_array()
                    .map(|orgs| u32::try_from(orgs.len()).unwrap_or(u32::MAX))
                    .ok_or_else(|| FetchError::validation("expected an array of organizations"))
            }),
        }
    }

    async fn load(&self, login: &str) -> std::result::Result<GithubActivity, FetchError> {
        let profile = self
            .http
            .get_cached(
                &self.cache,
                &cache_key("github", login, "profile"),
                format!("/users/{login}"),
                Vec::new(),
                &self.profile,
            )
            .await?;

        let events_key = cache_key("github", login, "events");
        let pull_requests_key = cache_key("github", login, "pull_requests");
        let orgs_key = cache_key("github", login, "orgs");
        let (repositories, events, issues, pull_requests, organizations) = tokio::try_join!(
            self.repositories(login),
            self.http.get_cached(
                &self.cache,
                &events_key,
                format!("/users/{login}/events/public"),
                vec![("per_page", "100".to_string())],
                &self.events,
            ),
            self.issue_counts(login),
            self.http.get_cached(
                &self.cache,
                &pull_requests_key,
                "/search/issues".to_string(),
                vec![
                    ("q", format!("author:{login} type:pr")),
                    ("sort", "created".to_string()),
                    ("order", "desc".to_string()),
                    ("per_page", MAX_PULL_REQUESTS.to_string()),
                ],
                &self.pull_requests,
            ),
            self.http.get_cached(
                &self.cache,
                &orgs_key,
                format!("/users/{login}/orgs"),
                Vec::new(),
                &self.organizations,
            ),
        )?;

        Ok(assemble(
            profile,
            repositories,
            &events,
            issues,
            pull_requests,
            organizations,
            Utc::now(),
        ))
    }

    async fn repositories(
        &self,
        login: &str,
    ) -> std::result::Result<Vec<RepositorySummary>, FetchError> {
        let mut repos = self
            .http
            .get_cached(
                &self.cache,
                &cache_key("github", login, "repos"),
                format!("/users/{login}/repos"),
                vec![
                    ("sort", "pushed".to_string()),
                    ("per_page", "100".to_string()),
                    ("type", "owner".to_string()),
                ],
                &self.repositories,
            )
            .await?;
        repos.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        repos.truncate(MAX_REPOSITORIES);

        let readmes =
            futures::future::join_all(repos.iter().map(|repo| self.has_readme(login, &repo.name)))
                .await;
        for (repo, has_readme) in repos.iter_mut().zip(readmes) {
            repo.has_readme = has_readme;
        }
        Ok(repos)
    }

    /// README presence; a missing README is cached as `false`
    async fn has_readme(&self, login: &str, repo: &str) -> bool {
        let http = Arc::clone(&self.http);
        let path = format!("/repos/{login}/{repo}/readme");
        let result = self
            .cache
            .fetch(
                &cache_key("github", &format!("{login}/{repo}"), "readme"),
                move |token| {
                    let http = Arc::clone(&http);
                    let path = path.clone();
                    async move {
                        match http.get_json(&path, &[], &token).await {
                            Ok(_) => Ok(Value::Bool(true)),
                            Err(FetchError::NotFound(_)) => Ok(Value::Bool(false)),
                            Err(e) => Err(e),
                        }
                    }
                },
                &self.readme,
            )
            .await;

        result.unwrap_or_else(|e| {
            debug!(repo, error = %e, "README lookup failed; counting as absent");
            false
        })
    }

    async fn issue_counts(&self, login: &str) -> std::result::Result<IssueCounts, FetchError> {
        let search = |state: Option<&str>| {
            let mut q = format!("author:{login} type:issue");
            if let Some(state) = state {
                q.push_str(" state:");
                q.push_str(state);
            }
            let key = cache_key("github", login, &format!("issues_{}", state.unwrap_or("all")));
            async move {
                self.http
                    .get_cached(
                        &self.cache,
                        &key,
                        "/search/issues".to_string(),
                        vec![("q", q), ("per_page", "1".to_string())],
                        &self.issue_total,
                    )
                    .await
            }
        };
        let (opened, closed) = tokio::try_join!(search(None), search(Some("closed")))?;
        Ok(IssueCounts { opened, closed })
    }
}

#[async_trait]
impl ActivitySource for GithubSource {
    type Record = GithubActivity;

    fn source(&self) -> Source {
        Source::GitHub
    }

    async fn fetch_activity(
        &self,
        identity: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<GithubActivity, FetchError> {
        let login = normalize_login(identity)?;
        until_cancelled(&cancel, self.load(&login)).await
    }
}

/// Validate a login: 1-39 alphanumerics or single inner hyphens, `@` prefix allowed
///
/// # Errors
///
/// Returns [`FetchError::Validation`] for malformed logins.
pub fn normalize_login(identity: &str) -> std::result::Result<String, FetchError> {
    let login = identity.trim().trim_start_matches('@');
    let valid = !login.is_empty()
        && login.len() <= 39
        && !login.starts_with('-')
        && !login.ends_with('-')
        && !login.contains("--")
        && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(login.to_string())
    } else {
        Err(FetchError::validation(format!("invalid GitHub login {identity:?}")))
    }
}

/// Parse `GET /users/{login}`
///
/// # Errors
///
/// Returns [`FetchError::Validation`] if the login or creation time is missing.
pub fn parse_profile(data: &Value) -> std::result::Result<GithubProfile, FetchError> {
    Ok(GithubProfile {
        login: required_str(data, "login")?,
        created_at: timestamp(&data["created_at"])
            .ok_or_else(|| FetchError::validation("missing field `created_at`"))?,
        public_repos: count(&data["public_repos"]),
        public_gists: count(&data["public_gists"]),
        followers: count(&data["followers"]),
        following: count(&data["following"]),
    })
}

/// Parse `GET /users/{login}/repos`, skipping forks
///
/// # Errors
///
/// Returns [`FetchError::Validation`] if the body is not an array.
pub fn parse_repositories(data: &Value) -> std::result::Result<Vec<RepositorySummary>, FetchError> {
    let repos = data
        .as_array()
        .ok_or_else(|| FetchError::validation("expected an array of repositories"))?;

    Ok(repos
        .iter()
        .filter(|repo| !repo["fork"].as_bool().unwrap_or(false))
        .filter_map(|repo| {
            let updated_at =
                timestamp(&repo["pushed_at"]).or_else(|| timestamp(&repo["updated_at"]))?;
            Some(RepositorySummary {
                name: repo["name"].as_str()?.to_string(),
                has_description: repo["description"]
                    .as_str()
                    .is_some_and(|d| !d.trim().is_empty()),
                has_readme: false,
                has_license: repo["license"].is_object(),
                topics: repo["topics"]
                    .as_array()
                    .map_or(0, |t| u32::try_from(t.len()).unwrap_or(u32::MAX)),
                stars: count(&repo["stargazers_count"]),
                forks: count(&repo["forks_count"]),
                private: repo["private"].as_bool().unwrap_or(false),
                updated_at,
            })
        })
        .collect())
}

/// Parse `GET /users/{login}/events/public`, keeping contribution events
///
/// # Errors
///
/// Returns [`FetchError::Validation`] if the body is not an array.
pub fn parse_events(data: &Value) -> std::result::Result<Vec<GithubEvent>, FetchError> {
    let events = data
        .as_array()
        .ok_or_else(|| FetchError::validation("expected an array of events"))?;

    Ok(events
        .iter()
        .filter_map(|event| {
            let created_at = timestamp(&event["created_at"])?;
            let payload = &event["payload"];
            let (kind, commits) = match event["type"].as_str()? {
                "PushEvent" => {
                    let commits = payload["size"]
                        .as_u64()
                        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                        .or_else(|| {
                            payload["commits"]
                                .as_array()
                                .map(|c| u32::try_from(c.len()).unwrap_or(u32::MAX))
                        })
                        .unwrap_or(1);
                    (EventKind::Push, commits)
                }
                "PullRequestEvent" if payload["action"] == "opened" => {
                    (EventKind::PullRequestOpened, 0)
                }
                "IssuesEvent" if payload["action"] == "opened" => (EventKind::IssueOpened, 0),
                "PullRequestReviewEvent" => (EventKind::Review, 0),
                _ => return None,
            };
            Some(GithubEvent {
                kind,
                commits,
                created_at,
            })
        })
        .collect())
}

/// Parse a `type:pr` issue search
///
/// # Errors
///
/// Returns [`FetchError::Validation`] if `items` is missing.
pub fn parse_pull_requests(
    data: &Value,
) -> std::result::Result<Vec<PullRequestSummary>, FetchError> {
    let items = data["items"]
        .as_array()
        .ok_or_else(|| FetchError::validation("missing field `items`"))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            Some(PullRequestSummary {
                body_len: item["body"].as_str().map_or(0, |b| b.trim().chars().count()),
                commits: None,
                merged: !item["pull_request"]["merged_at"].is_null(),
                created_at: timestamp(&item["created_at"])?,
            })
        })
        .take(MAX_PULL_REQUESTS)
        .collect())
}

/// Commit windows and contribution total derived from the event feed
#[derive(Debug, Clone, PartialEq, Eq)]
struct CommitStats {
    last_30d: u32,
    last_90d: u32,
    weekly: Vec<u32>,
    contributions: u32,
}

fn commit_stats(events: &[GithubEvent], now: DateTime<Utc>) -> CommitStats {
    let mut stats = CommitStats {
        last_30d: 0,
        last_90d: 0,
        weekly: vec![0; WEEKS],
        contributions: 0,
    };

    for event in events {
        let Ok(days_ago) = usize::try_from((now - event.created_at).num_days()) else {
            continue;
        };
        let weight = match event.kind {
            EventKind::Push => event.commits,
            _ => 1,
        };
        stats.contributions = stats.contributions.saturating_add(weight);

        if event.kind != EventKind::Push {
            continue;
        }
        if days_ago < 30 {
            stats.last_30d = stats.last_30d.saturating_add(event.commits);
        }
        if days_ago < 90 {
            stats.last_90d = stats.last_90d.saturating_add(event.commits);
        }
        let week = days_ago / 7;
        if week < WEEKS {
            let slot = &mut stats.weekly[WEEKS - 1 - week];
            *slot = slot.saturating_add(event.commits);
        }
    }
    stats
}

fn assemble(
    profile: GithubProfile,
    repositories: Vec<RepositorySummary>,
    events: &[GithubEvent],
    issues: IssueCounts,
    pull_requests: Vec<PullRequestSummary>,
    organizations: u32,
    fetched_at: DateTime<Utc>,
) -> GithubActivity {
    let commits = commit_stats(events, fetched_at);
    GithubActivity {
        login: profile.login,
        account_created_at: profile.created_at,
        public_repos: profile.public_repos,
        public_gists: profile.public_gists,
        followers: profile.followers,
        following: profile.following,
        organizations,
        total_contributions: commits.contributions,
        commits_last_30d: commits.last_30d,
        commits_last_90d: commits.last_90d,
        weekly_commits: commits.weekly,
        issues_opened: issues.opened,
        issues_closed: issues.closed,
        pull_requests,
        repositories,
        fetched_at,
    }
}
