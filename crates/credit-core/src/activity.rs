//! Canonical per-source activity records
//!
//! Adapters normalize third-party responses into these shapes; scorers consume
//! them. Records are plain values and never mutated after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized GitHub activity of one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubActivity {
    /// Account login
    pub login: String,
    /// Account creation time
    pub account_created_at: DateTime<Utc>,
    /// Public repository count reported by the profile
    pub public_repos: u32,
    /// Public gist count
    pub public_gists: u32,
    /// Followers
    pub followers: u32,
    /// Accounts followed
    pub following: u32,
    /// Public organization memberships
    pub organizations: u32,
    /// Contributions observed in the activity window (commits, issues, PRs, reviews)
    pub total_contributions: u32,
    /// Commits pushed in the last 30 days
    pub commits_last_30d: u32,
    /// Commits pushed in the last 90 days
    pub commits_last_90d: u32,
    /// Commit totals per week, oldest first, covering the last 13 weeks
    pub weekly_commits: Vec<u32>,
    /// Issues authored
    pub issues_opened: u32,
    /// Authored issues that are closed
    pub issues_closed: u32,
    /// Recently authored pull requests
    pub pull_requests: Vec<PullRequestSummary>,
    /// Owned repositories
    pub repositories: Vec<RepositorySummary>,
    /// When the record was assembled
    pub fetched_at: DateTime<Utc>,
}

/// One authored pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    /// Length of the description in characters
    pub body_len: usize,
    /// Commit count, when the listing exposes it
    pub commits: Option<u32>,
    /// Whether the PR was merged
    pub merged: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// One owned repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    /// Repository name
    pub name: String,
    /// Has a non-empty description
    pub has_description: bool,
    /// Has a README
    pub has_readme: bool,
    /// Declares a license
    pub has_license: bool,
    /// Number of topics
    pub topics: u32,
    /// Stargazers
    pub stars: u32,
    /// Forks
    pub forks: u32,
    /// Private repository
    pub private: bool,
    /// Last push/update time
    pub updated_at: DateTime<Utc>,
}

/// Normalized Farcaster activity of one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarcasterActivity {
    /// Farcaster id
    pub fid: u64,
    /// Username
    pub username: String,
    /// Followers
    pub followers: u32,
    /// Accounts followed
    pub following: u32,
    /// Top-level casts in the last 30 days
    pub casts_last_30d: u32,
    /// Replies in the last 30 days
    pub replies_last_30d: u32,
    /// Likes received on recent casts
    pub likes_received: u32,
    /// Recasts received on recent casts
    pub recasts_received: u32,
    /// Holds the power badge
    pub power_badge: bool,
    /// Verified Ethereum addresses, lowercase
    pub verified_addresses: Vec<String>,
    /// When the record was assembled
    pub fetched_at: DateTime<Utc>,
}

/// Normalized Lens activity of one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensActivity {
    /// Full handle, e.g. `lens/alice`
    pub handle: String,
    /// Owning address, lowercase
    pub owned_by: String,
    /// Followers
    pub followers: u32,
    /// Profiles followed
    pub following: u32,
    /// Posts
    pub posts: u32,
    /// Comments
    pub comments: u32,
    /// Mirrors
    pub mirrors: u32,
    /// Reactions received
    pub reactions_received: u32,
    /// Collects received
    pub collects_received: u32,
    /// Profile creation time
    pub created_at: DateTime<Utc>,
    /// When the record was assembled
    pub fetched_at: DateTime<Utc>,
}

/// Normalized explorer activity of one wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainActivity {
    /// Wallet address, lowercase
    pub address: String,
    /// Outgoing and incoming normal transactions
    pub tx_count: u32,
    /// First observed transaction
    pub first_tx_at: Option<DateTime<Utc>>,
    /// Most recent transaction
    pub last_tx_at: Option<DateTime<Utc>>,
    /// Distinct calendar months with at least one transaction
    pub active_months: u32,
    /// Distinct counterparties
    pub unique_counterparties: u32,
    /// Contracts created by the wallet
    pub contracts_deployed: u32,
    /// ERC-20 transfer events
    pub token_transfers: u32,
    /// Distinct ERC-20 tokens touched
    pub distinct_tokens: u32,
    /// Native balance in ether
    pub balance_eth: f64,
    /// When the record was assembled
    pub fetched_at: DateTime<Utc>,
}
