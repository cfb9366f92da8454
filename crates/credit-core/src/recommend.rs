//! Improvement recommendations
//!
//! Advisory output only; nothing here feeds back into scoring.

use serde::{Deserialize, Serialize};

use crate::model::{Category, DataStatus, Priority, Source, SubScore};

/// One improvement suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Category of the under-performing source
    pub category: Category,
    /// The source itself
    pub source: Source,
    /// Fixed per category
    pub priority: Priority,
    /// What to do
    pub action: String,
    /// Expected effect on the total score
    pub impact: String,
}

/// Per-source thresholds below which a recommendation is emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationPolicy {
    /// GitHub
    pub github: u8,
    /// Farcaster
    pub farcaster: u8,
    /// Lens
    pub lens: u8,
    /// On-chain
    pub onchain: u8,
    /// Identity consistency
    pub identity: u8,
}

impl Default for RecommendationPolicy {
    fn default() -> Self {
        Self {
            github: 60,
            farcaster: 50,
            lens: 50,
            onchain: 50,
            identity: 60,
        }
    }
}

impl RecommendationPolicy {
    /// Threshold for `source`
    #[must_use]
    pub fn threshold(&self, source: Source) -> u8 {
        match source {
            Source::GitHub => self.github,
            Source::Farcaster => self.farcaster,
            Source::Lens => self.lens,
            Source::OnChain => self.onchain,
            Source::Identity => self.identity,
        }
    }

    /// Recommendations for every sub-score below its threshold, most urgent first
    #[must_use]
    pub fn recommend(&self, sub_scores: &[SubScore]) -> Vec<Recommendation> {
        let mut recs: Vec<Recommendation> = sub_scores
            .iter()
            .filter(|s| s.score < self.threshold(s.source))
            .map(|s| {
                let category = s.source.category();
                Recommendation {
                    category,
                    source: s.source,
                    priority: category.priority(),
                    action: action(s),
                    impact: impact(s, self.threshold(s.source)),
                }
            })
            .collect();
        recs.sort_by_key(|r| (r.priority, r.source));
        recs
    }

    /// Human-readable requirements for an ineligible result
    #[must_use]
    pub fn requirements(&self, sub_scores: &[SubScore]) -> Vec<String> {
        sub_scores
            .iter()
            .filter(|s| s.score < self.threshold(s.source))
            .map(|s| match &s.status {
                DataStatus::NotConnected if s.source != Source::Identity => {
                    format!("Connect a {} account", s.source.label())
                }
                _ => format!(
                    "Raise the {} score from {} to at least {}",
                    s.source.label(),
                    s.score,
                    self.threshold(s.source)
                ),
            })
            .collect()
    }
}

fn action(sub: &SubScore) -> String {
    match (&sub.status, sub.source) {
        (DataStatus::NotConnected, Source::Identity) => {
            "Connect at least two accounts so your identities can be cross-checked".to_string()
        }
        (DataStatus::NotConnected, source) => {
            format!("Connect your {} account", source.label())
        }
        (DataStatus::Unavailable(reason), source) => {
            format!("Retry once {} data is reachable again ({reason})", source.label())
        }
        (DataStatus::Available, Source::GitHub) => {
            "Commit regularly, describe your pull requests and keep repositories licensed and documented"
                .to_string()
        }
        (DataStatus::Available, Source::Farcaster) => {
            "Cast consistently, reply to your community and verify your wallet on Farcaster"
                .to_string()
        }
        (DataStatus::Available, Source::Lens) => {
            "Publish and comment on Lens more often to grow your audience".to_string()
        }
        (DataStatus::Available, Source::OnChain) => {
            "Build wallet history: interact with more protocols and deploy contracts from this address"
                .to_string()
        }
        (DataStatus::Available, Source::Identity) => {
            "Use one handle across platforms and verify your wallet on your social profiles"
                .to_string()
        }
    }
}

/// Points the total score gains if the sub-score reaches its threshold
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn impact(sub: &SubScore, threshold: u8) -> String {
    let gap = f64::from(threshold.saturating_sub(sub.score));
    // epsilon keeps 20.000000000000004 from ceiling to 21
    let points = (gap * sub.weight - 1e-9).ceil().max(0.0) as u32;
    format!("Up to +{points} points on the total score")
}
