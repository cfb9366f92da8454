//! Funding eligibility
//!
//! Eligibility is derived, never set: tier picks the base amount, rate and terms;
//! a handful of sub-score conditions add percentage bonuses on top. Amounts are
//! computed in integer arithmetic and rounded down to whole currency units.

use serde::{Deserialize, Serialize};

use crate::model::{Source, SubScore};
use crate::recommend::RecommendationPolicy;
use crate::tier::CreditTier;

/// Funding decision for one scoring result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    /// Whether funding may be offered
    pub eligible: bool,
    /// Amount in whole currency units
    pub amount: u64,
    /// Annual interest rate in percent
    pub interest_rate: f64,
    /// Repayment terms
    pub repayment_terms: String,
    /// Conditions attached to the offer, or requirements to become eligible
    pub conditions: Vec<String>,
}

/// Base amount per eligible tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierAmounts {
    /// Premium
    pub premium: u64,
    /// Excellent
    pub excellent: u64,
    /// Good
    pub good: u64,
    /// Fair
    pub fair: u64,
    /// Limited
    pub limited: u64,
}

impl Default for TierAmounts {
    fn default() -> Self {
        Self {
            premium: 50_000,
            excellent: 25_000,
            good: 10_000,
            fair: 5_000,
            limited: 1_000,
        }
    }
}

impl TierAmounts {
    /// Base amount for `tier`
    #[must_use]
    pub fn for_tier(&self, tier: CreditTier) -> u64 {
        match tier {
            CreditTier::Premium => self.premium,
            CreditTier::Excellent => self.excellent,
            CreditTier::Good => self.good,
            CreditTier::Fair => self.fair,
            CreditTier::Limited => self.limited,
            CreditTier::Unqualified => 0,
        }
    }
}

/// Funding rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingPolicy {
    /// Minimum total score for any funding
    pub min_score: u8,
    /// Base amount per tier
    pub amounts: TierAmounts,
    /// Bonus when the GitHub sub-score exceeds `code_hosting_threshold`
    pub code_hosting_bonus_percent: u32,
    /// GitHub sub-score that must be exceeded for the code-hosting bonus
    pub code_hosting_threshold: u8,
    /// Bonus when more than one social source has verified data
    pub multi_social_bonus_percent: u32,
    /// Bonus when the identity sub-score exceeds `identity_threshold`
    pub identity_bonus_percent: u32,
    /// Identity sub-score that must be exceeded for the identity bonus
    pub identity_threshold: u8,
}

impl Default for FundingPolicy {
    fn default() -> Self {
        Self {
            min_score: 25,
            amounts: TierAmounts::default(),
            code_hosting_bonus_percent: 10,
            code_hosting_threshold: 80,
            multi_social_bonus_percent: 5,
            identity_bonus_percent: 5,
            identity_threshold: 85,
        }
    }
}

impl FundingPolicy {
    /// Check that amounts never decrease as the tier rises
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation.
    pub fn check(&self) -> Result<(), String> {
        let eligible = &CreditTier::ALL[1..];
        for pair in eligible.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if self.amounts.for_tier(lower) > self.amounts.for_tier(upper) {
                return Err(format!(
                    "funding amount for {lower} exceeds the amount for {upper}"
                ));
            }
        }
        if self.min_score > 100 {
            return Err(format!("min_score must be at most 100, got {}", self.min_score));
        }
        Ok(())
    }

    /// Derive eligibility from the total score, tier and sub-scores
    #[must_use]
    pub fn evaluate(
        &self,
        total_score: u8,
        tier: CreditTier,
        sub_scores: &[SubScore],
        thresholds: &RecommendationPolicy,
    ) -> Eligibility {
        if tier == CreditTier::Unqualified || total_score < self.min_score {
            let mut conditions = thresholds.requirements(sub_scores);
            conditions.push(format!(
                "Reach a total score of at least {} (currently {total_score})",
                self.min_score.max(CreditTier::Limited.min_score())
            ));
            return Eligibility {
                eligible: false,
                amount: 0,
                interest_rate: 0.0,
                repayment_terms: CreditTier::Unqualified.repayment_terms().to_string(),
                conditions,
            };
        }

        let mut conditions = vec![format!(
            "Maintain a total score of at least {}",
            self.min_score
        )];
        let mut bonus_percent = 0u32;
        for (percent, reason) in self.bonuses(sub_scores) {
            bonus_percent += percent;
            conditions.push(format!("Includes +{percent}% bonus: {reason}"));
        }

        let base = self.amounts.for_tier(tier);
        let amount = base.saturating_mul(100 + u64::from(bonus_percent)) / 100;

        Eligibility {
            eligible: true,
            amount,
            interest_rate: tier.interest_rate(),
            repayment_terms: tier.repayment_terms().to_string(),
            conditions,
        }
    }

    /// Bonuses earned by `sub_scores`, as `(percent, reason)` in a fixed order
    fn bonuses(&self, sub_scores: &[SubScore]) -> Vec<(u32, String)> {
        let score_of = |source: Source| {
            sub_scores
                .iter()
                .find(|s| s.source == source)
                .map_or(0, |s| s.score)
        };
        let available = |source: Source| {
            sub_scores
                .iter()
                .any(|s| s.source == source && s.status.is_available())
        };

        let mut bonuses = Vec::new();
        if score_of(Source::GitHub) > self.code_hosting_threshold {
            bonuses.push((
                self.code_hosting_bonus_percent,
                format!("GitHub score above {}", self.code_hosting_threshold),
            ));
        }
        if available(Source::Farcaster) && available(Source::Lens) {
            bonuses.push((
                self.multi_social_bonus_percent,
                "verified presence on more than one social protocol".to_string(),
            ));
        }
        if score_of(Source::Identity) > self.identity_threshold {
            bonuses.push((
                self.identity_bonus_percent,
                format!("identity consistency above {}", self.identity_threshold),
            ));
        }
        bonuses
    }
}
