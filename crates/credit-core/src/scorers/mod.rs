//! Per-source scorers
//!
//! Every scorer is a pure `record -> ScoreCard` function. Sub-metrics cap their own
//! contribution before being summed, so one outlier input (a repository with ten
//! thousand stars, a wallet with a million transactions) can saturate at most its
//! own term and never the whole sub-score.

pub mod farcaster;
pub mod github;
pub mod identity;
pub mod lens;
pub mod onchain;

use chrono::{DateTime, Utc};

pub use identity::IdentityInputs;

use crate::model::bounded;

/// `min(value, cap)` with negatives and non-finite values mapped to zero
pub(crate) fn capped(value: f64, cap: f64) -> f64 {
    bounded(value, cap)
}

/// `factor * ln(1 + n)`, capped
pub(crate) fn log_scaled(n: f64, factor: f64, cap: f64) -> f64 {
    capped(factor * n.max(0.0).ln_1p(), cap)
}

/// `num / den`, or zero when `den` is zero
pub(crate) fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

/// Whole days between `earlier` and `now`, never negative
#[allow(clippy::cast_precision_loss)]
pub(crate) fn days_between(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - earlier).num_days().max(0) as f64
}
