//! GitHub scorer
//!
//! | Category                | Weight |
//! |-------------------------|--------|
//! | commit consistency      | 0.25   |
//! | code quality            | 0.25   |
//! | repository health       | 0.20   |
//! | open-source contribution| 0.20   |
//! | community engagement    | 0.10   |
//!
//! All time-relative terms are measured against `fetched_at`, not the wall clock.

use crate::activity::{GithubActivity, PullRequestSummary, RepositorySummary};
use crate::model::ScoreCard;

use super::{capped, days_between, log_scaled, ratio};

const W_COMMIT_CONSISTENCY: f64 = 0.25;
const W_CODE_QUALITY: f64 = 0.25;
const W_REPO_HEALTH: f64 = 0.20;
const W_OPEN_SOURCE: f64 = 0.20;
const W_COMMUNITY: f64 = 0.10;

/// Score a GitHub activity record
#[must_use]
pub fn score(record: &GithubActivity) -> ScoreCard {
    ScoreCard::from_components(&[
        ("commit_consistency", W_COMMIT_CONSISTENCY, commit_consistency(record)),
        ("code_quality", W_CODE_QUALITY, code_quality(record)),
        ("repository_health", W_REPO_HEALTH, repository_health(record)),
        ("open_source_contribution", W_OPEN_SOURCE, open_source_contribution(record)),
        ("community_engagement", W_COMMUNITY, community_engagement(record)),
    ])
}

/// Recent volume + 90-day weekly rate + low-variance bonus
fn commit_consistency(record: &GithubActivity) -> f64 {
    let recent = capped(f64::from(record.commits_last_30d) * 1.5, 40.0);
    let weekly_rate = capped(f64::from(record.commits_last_90d) / 13.0 * 3.0, 30.0);
    let bonus = consistency_bonus(&record.weekly_commits);
    capped(recent + weekly_rate + bonus, 100.0)
}

/// `30 * (1 - min(cv, 1))` over weekly totals; zero when there were no commits
#[allow(clippy::cast_precision_loss)]
fn consistency_bonus(weekly: &[u32]) -> f64 {
    if weekly.is_empty() {
        return 0.0;
    }
    let n = weekly.len() as f64;
    let mean = weekly.iter().map(|w| f64::from(*w)).sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = weekly
        .iter()
        .map(|w| (f64::from(*w) - mean).powi(2))
        .sum::<f64>()
        / n;
    let cv = variance.sqrt() / mean;
    30.0 * (1.0 - cv.min(1.0))
}

#[allow(clippy::cast_precision_loss)]
fn code_quality(record: &GithubActivity) -> f64 {
    let issue_rate = ratio(
        f64::from(record.issues_closed.min(record.issues_opened)),
        f64::from(record.issues_opened),
    );
    let prs = &record.pull_requests;
    let merged = prs.iter().filter(|pr| pr.merged).count() as f64;
    let merge_rate = ratio(merged, prs.len() as f64);
    let avg_quality = ratio(
        prs.iter().map(|pr| pr_quality(pr, record)).sum::<f64>(),
        prs.len() as f64,
    );
    capped(issue_rate * 30.0 + merge_rate * 40.0 + avg_quality * 30.0, 100.0)
}

/// PR heuristic in `[0, 1]`: description, commit-count sanity, recency
fn pr_quality(pr: &PullRequestSummary, record: &GithubActivity) -> f64 {
    let description = if pr.body_len >= 100 {
        0.4
    } else if pr.body_len >= 20 {
        0.2
    } else {
        0.0
    };
    let commits = match pr.commits {
        Some(1..=20) => 0.3,
        Some(_) => 0.0,
        None => 0.15,
    };
    let recency = if days_between(pr.created_at, record.fetched_at) <= 90.0 {
        0.3
    } else {
        0.0
    };
    description + commits + recency
}

#[allow(clippy::cast_precision_loss)]
fn repository_health(record: &GithubActivity) -> f64 {
    if record.repositories.is_empty() {
        return 0.0;
    }
    let total: f64 = record
        .repositories
        .iter()
        .map(|repo| repo_health(repo, record))
        .sum();
    capped(total / record.repositories.len() as f64, 100.0)
}

fn repo_health(repo: &RepositorySummary, record: &GithubActivity) -> f64 {
    let age_days = days_between(repo.updated_at, record.fetched_at);
    let recency = if age_days <= 30.0 {
        25.0
    } else if age_days <= 90.0 {
        15.0
    } else if age_days <= 365.0 {
        5.0
    } else {
        0.0
    };
    let flag = |present: bool, points: f64| if present { points } else { 0.0 };

    recency
        + flag(repo.has_description, 10.0)
        + flag(repo.has_readme, 15.0)
        + flag(repo.has_license, 10.0)
        + capped(f64::from(repo.topics) * 2.0, 10.0)
        + log_scaled(f64::from(repo.stars), 5.0, 15.0)
        + log_scaled(f64::from(repo.forks), 4.0, 10.0)
        + flag(!repo.private, 5.0)
}

fn open_source_contribution(record: &GithubActivity) -> f64 {
    let repos = capped(f64::from(record.public_repos) * 2.0, 30.0);
    let contributions = capped(f64::from(record.total_contributions) / 10.0, 40.0);
    let orgs = capped(f64::from(record.organizations) * 5.0, 20.0);
    let gists = capped(f64::from(record.public_gists) * 2.0, 10.0);
    capped(repos + contributions + orgs + gists, 100.0)
}

fn community_engagement(record: &GithubActivity) -> f64 {
    let followers = log_scaled(f64::from(record.followers), 10.0, 40.0);
    let follow_ratio = if record.following == 0 {
        if record.followers > 0 { 20.0 } else { 0.0 }
    } else {
        capped(
            f64::from(record.followers) / f64::from(record.following) * 10.0,
            20.0,
        )
    };
    let years = days_between(record.account_created_at, record.fetched_at) / 365.0;
    let tenure = capped(years * 8.0, 40.0);
    capped(followers + follow_ratio + tenure, 100.0)
}
