//! On-chain scorer
//!
//! activity 0.30, longevity 0.25, diversity 0.20, builder 0.15, holdings 0.10.

use crate::activity::OnChainActivity;
use crate::model::ScoreCard;

use super::{capped, days_between, log_scaled};

/// Score an on-chain activity record
#[must_use]
pub fn score(record: &OnChainActivity) -> ScoreCard {
    let activity = log_scaled(f64::from(record.tx_count), 15.0, 70.0)
        + capped(f64::from(record.active_months) * 3.0, 30.0);

    let history = record
        .first_tx_at
        .map_or(0.0, |first| {
            capped(days_between(first, record.fetched_at) / 30.0 * 4.0, 70.0)
        });
    let recency = match record.last_tx_at.map(|t| days_between(t, record.fetched_at)) {
        Some(d) if d <= 30.0 => 30.0,
        Some(d) if d <= 90.0 => 15.0,
        _ => 0.0,
    };

    let diversity = capped(f64::from(record.unique_counterparties) * 2.0, 60.0)
        + capped(f64::from(record.distinct_tokens) * 4.0, 40.0);
    let builder = capped(f64::from(record.contracts_deployed) * 20.0, 100.0);
    let holdings = log_scaled(record.balance_eth, 25.0, 100.0);

    ScoreCard::from_components(&[
        ("activity", 0.30, activity),
        ("longevity", 0.25, history + recency),
        ("diversity", 0.20, diversity),
        ("builder", 0.15, builder),
        ("holdings", 0.10, holdings),
    ])
}
