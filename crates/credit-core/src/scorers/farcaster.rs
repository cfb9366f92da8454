//! Farcaster scorer: reach 0.30, activity 0.25, engagement 0.30, reputation 0.15

use crate::activity::FarcasterActivity;
use crate::model::ScoreCard;

use super::{capped, log_scaled, ratio};

/// Score a Farcaster activity record
#[must_use]
pub fn score(record: &FarcasterActivity) -> ScoreCard {
    let casts = f64::from(record.casts_last_30d);

    let reach = log_scaled(f64::from(record.followers), 15.0, 100.0);
    let activity = capped(casts * 2.0 + f64::from(record.replies_last_30d), 100.0);
    // recasts carry twice the signal of a like
    let per_cast = ratio(
        f64::from(record.likes_received) + 2.0 * f64::from(record.recasts_received),
        casts,
    );
    let engagement = capped(per_cast * 10.0, 100.0);
    let badge = if record.power_badge { 50.0 } else { 0.0 };
    #[allow(clippy::cast_precision_loss)]
    let verifications = capped(record.verified_addresses.len() as f64 * 25.0, 50.0);

    ScoreCard::from_components(&[
        ("reach", 0.30, reach),
        ("activity", 0.25, activity),
        ("engagement", 0.30, engagement),
        ("reputation", 0.15, badge + verifications),
    ])
}
