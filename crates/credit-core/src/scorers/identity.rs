//! Identity-consistency scorer
//!
//! Rewards a developer whose identities corroborate each other: several linked
//! sources, a wallet that the social profiles verify, and one handle reused across
//! platforms.

use std::collections::BTreeMap;

use crate::activity::{FarcasterActivity, GithubActivity, LensActivity, OnChainActivity};
use crate::model::ScoreCard;

use super::capped;

/// Records available to the identity scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityInputs<'a> {
    /// GitHub record, when fetched
    pub github: Option<&'a GithubActivity>,
    /// Farcaster record, when fetched
    pub farcaster: Option<&'a FarcasterActivity>,
    /// Lens record, when fetched
    pub lens: Option<&'a LensActivity>,
    /// On-chain record, when fetched
    pub onchain: Option<&'a OnChainActivity>,
}

impl IdentityInputs<'_> {
    /// Number of sources with data
    #[must_use]
    pub fn linked_sources(&self) -> usize {
        [
            self.github.is_some(),
            self.farcaster.is_some(),
            self.lens.is_some(),
            self.onchain.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// `true` when no source produced data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.linked_sources() == 0
    }
}

/// Score identity consistency across the supplied records
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score(inputs: &IdentityInputs<'_>) -> ScoreCard {
    let linked = capped(inputs.linked_sources() as f64 * 25.0, 100.0);

    ScoreCard::from_components(&[
        ("linked_sources", 0.40, linked),
        ("wallet_verification", 0.35, wallet_verification(inputs)),
        ("handle_consistency", 0.25, handle_consistency(inputs)),
    ])
}

/// 50 points for each social profile that vouches for the scored wallet
fn wallet_verification(inputs: &IdentityInputs<'_>) -> f64 {
    let Some(wallet) = inputs.onchain.map(|o| o.address.to_ascii_lowercase()) else {
        return 0.0;
    };
    let farcaster = inputs.farcaster.is_some_and(|f| {
        f.verified_addresses
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&wallet))
    });
    let lens = inputs
        .lens
        .is_some_and(|l| l.owned_by.eq_ignore_ascii_case(&wallet));
    capped(
        f64::from(u8::from(farcaster) + u8::from(lens)) * 50.0,
        100.0,
    )
}

/// 50 points per additional platform sharing the most common handle
#[allow(clippy::cast_precision_loss)]
fn handle_consistency(inputs: &IdentityInputs<'_>) -> f64 {
    let handles = [
        inputs.github.map(|g| normalize_handle(&g.login)),
        inputs.farcaster.map(|f| normalize_handle(&f.username)),
        inputs.lens.map(|l| normalize_handle(&l.handle)),
    ];
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for handle in handles.into_iter().flatten().filter(|h| !h.is_empty()) {
        *counts.entry(handle).or_default() += 1;
    }
    let best = counts.values().copied().max().unwrap_or(0);
    capped(best.saturating_sub(1) as f64 * 50.0, 100.0)
}

/// Lowercase and strip platform decorations (`@`, `lens/`, `.lens`, `.eth`)
#[must_use]
pub fn normalize_handle(raw: &str) -> String {
    let lower = raw.trim().trim_start_matches('@').to_ascii_lowercase();
    let local = lower.strip_prefix("lens/").unwrap_or(&lower);
    let local = local
        .strip_suffix(".lens")
        .or_else(|| local.strip_suffix(".eth"))
        .unwrap_or(local);
    local.to_string()
}
