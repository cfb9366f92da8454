//! Aggregation engine
//!
//! Combines weighted sub-scores into a [`CreditResult`]. The aggregator keeps no
//! state between calls: the result is a pure function of the sub-scores and the
//! supplied timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eligibility::FundingPolicy;
use crate::model::{to_score, CreditResult, DataStatus, ScoreCard, Source, SubScore};
use crate::recommend::RecommendationPolicy;
use crate::tier::CreditTier;
use crate::weights::Weights;

/// Scoring configuration plus the aggregation algorithm
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Aggregator {
    /// Per-source weights of the total
    pub weights: Weights,
    /// Funding rules
    pub funding: FundingPolicy,
    /// Recommendation thresholds
    pub recommendations: RecommendationPolicy,
}

impl Aggregator {
    /// Create an aggregator from its parts
    #[must_use]
    pub fn new(
        weights: Weights,
        funding: FundingPolicy,
        recommendations: RecommendationPolicy,
    ) -> Self {
        Self {
            weights,
            funding,
            recommendations,
        }
    }

    /// Validate weights and funding rules
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn check(&self) -> Result<(), String> {
        self.weights.check()?;
        self.funding.check()
    }

    /// Stamp a scorer's card with the configured weight of `source`
    #[must_use]
    pub fn sub_score(&self, source: Source, card: ScoreCard) -> SubScore {
        SubScore::scored(source, card, self.weights.weight(source))
    }

    /// Zero sub-score for `source` carrying the configured weight
    #[must_use]
    pub fn missing(&self, source: Source, status: DataStatus) -> SubScore {
        SubScore::no_data(source, self.weights.weight(source), status)
    }

    /// Aggregate sub-scores into a credit result.
    ///
    /// The output always holds one sub-score per [`Source`], in [`Source::ALL`]
    /// order; sources absent from the input are filled in as not connected. When a
    /// source appears more than once the first occurrence wins. Every sub-score is
    /// weighted with the configured weight of its source.
    #[must_use]
    pub fn aggregate(&self, sub_scores: &[SubScore], computed_at: DateTime<Utc>) -> CreditResult {
        let sub_scores: Vec<SubScore> = Source::ALL
            .iter()
            .map(|source| {
                sub_scores
                    .iter()
                    .find(|s| s.source == *source)
                    .map(|s| SubScore {
                        weight: self.weights.weight(*source),
                        ..s.clone()
                    })
                    .unwrap_or_else(|| self.missing(*source, DataStatus::NotConnected))
            })
            .collect();

        let total_score = to_score(sub_scores.iter().map(SubScore::contribution).sum());
        let tier = CreditTier::from_score(total_score);
        let eligibility = self
            .funding
            .evaluate(total_score, tier, &sub_scores, &self.recommendations);
        let recommendations = self.recommendations.recommend(&sub_scores);

        CreditResult {
            total_score,
            sub_scores,
            tier,
            eligibility,
            recommendations,
            computed_at,
        }
    }
}
