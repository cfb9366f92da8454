//! Lens scorer: audience 0.30, content 0.30, engagement 0.25, tenure 0.15

use crate::activity::LensActivity;
use crate::model::ScoreCard;

use super::{capped, days_between, log_scaled, ratio};

/// Score a Lens activity record
#[must_use]
pub fn score(record: &LensActivity) -> ScoreCard {
    let posts = f64::from(record.posts);

    let audience = log_scaled(f64::from(record.followers), 15.0, 100.0);
    let content = capped(
        posts * 2.0 + f64::from(record.comments) + f64::from(record.mirrors) * 0.5,
        100.0,
    );
    let per_post = ratio(
        f64::from(record.reactions_received) + 2.0 * f64::from(record.collects_received),
        posts,
    );
    let engagement = capped(per_post * 10.0, 100.0);
    // five points per month on the protocol
    let months = days_between(record.created_at, record.fetched_at) / 30.0;
    let tenure = capped(months * 5.0, 100.0);

    ScoreCard::from_components(&[
        ("audience", 0.30, audience),
        ("content", 0.30, content),
        ("engagement", 0.25, engagement),
        ("tenure", 0.15, tenure),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record() -> LensActivity {
        let now = Utc::now();
        LensActivity {
            handle: "lens/alice".into(),
            owned_by: "0xabc".into(),
            followers: 0,
            following: 0,
            posts: 0,
            comments: 0,
            mirrors: 0,
            reactions_received: 0,
            collects_received: 0,
            created_at: now,
            fetched_at: now,
        }
    }

    #[test]
    fn test_new_profile_scores_zero() {
        assert_eq!(score(&record()).score, 0);
    }

    #[test]
    fn test_tenure_caps_after_twenty_months() {
        let mut r = record();
        r.created_at = r.fetched_at - Duration::days(30 * 40);
        let card = score(&r);
        assert_eq!(card.breakdown["tenure"], 100.0);
        assert_eq!(card.score, 15);
    }

    #[test]
    fn test_content_mix() {
        let mut r = record();
        r.posts = 10;
        r.comments = 5;
        r.mirrors = 10;
        r.reactions_received = 20;
        r.collects_received = 5;
        let card = score(&r);
        assert_eq!(card.breakdown["content"], 30.0);
        // (20 + 10) / 10 = 3 per post
        assert_eq!(card.breakdown["engagement"], 30.0);
    }
}
