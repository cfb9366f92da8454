//! Score data model shared by scorers, the aggregator and consumers

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eligibility::Eligibility;
use crate::recommend::Recommendation;
use crate::tier::CreditTier;

/// Named sub-metric values of a score card.
///
/// A `BTreeMap` keeps serialization order stable so equal results serialize to
/// equal bytes.
pub type Breakdown = BTreeMap<String, f64>;

/// A scored identity/activity source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Source-control host
    GitHub,
    /// Farcaster social protocol
    Farcaster,
    /// Lens social protocol
    Lens,
    /// On-chain explorer activity of the wallet
    OnChain,
    /// Cross-source identity consistency
    Identity,
}

impl Source {
    /// Every source, in result order
    pub const ALL: [Source; 5] = [
        Source::GitHub,
        Source::Farcaster,
        Source::Lens,
        Source::OnChain,
        Source::Identity,
    ];

    /// Top-level category of this source
    #[must_use]
    pub fn category(self) -> Category {
        match self {
            Self::GitHub => Category::CodeHosting,
            Self::Farcaster | Self::Lens => Category::Social,
            Self::OnChain => Category::OnChain,
            Self::Identity => Category::Identity,
        }
    }

    /// Human-readable name
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::Farcaster => "Farcaster",
            Self::Lens => "Lens",
            Self::OnChain => "on-chain",
            Self::Identity => "identity",
        }
    }

    /// Stable key used in cache keys and logs
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Farcaster => "farcaster",
            Self::Lens => "lens",
            Self::OnChain => "onchain",
            Self::Identity => "identity",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Source category used for weighting and recommendation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Code hosting (GitHub)
    CodeHosting,
    /// Decentralized social (Farcaster, Lens)
    Social,
    /// Wallet activity
    OnChain,
    /// Identity consistency across sources
    Identity,
}

impl Category {
    /// Fixed recommendation priority of the category
    #[must_use]
    pub fn priority(self) -> Priority {
        match self {
            Self::CodeHosting => Priority::High,
            Self::Social | Self::OnChain => Priority::Medium,
            Self::Identity => Priority::Low,
        }
    }
}

/// Recommendation priority. Ordered most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Act on this first
    High,
    /// Worth doing
    Medium,
    /// Nice to have
    Low,
}

/// Whether a sub-score was computed from real data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DataStatus {
    /// Activity record was fetched and scored
    Available,
    /// No identity was supplied for this source
    NotConnected,
    /// The source could not be fetched
    Unavailable(String),
}

impl DataStatus {
    /// `true` when the score reflects fetched data
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Output of a per-source scorer: a bounded score plus its sub-metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    /// Bounded score in `[0, 100]`
    pub score: u8,
    /// Sub-metric values, each already capped
    pub breakdown: Breakdown,
}

impl ScoreCard {
    /// Combine `(name, internal_weight, value)` components into a card.
    ///
    /// Each value is clamped to `[0, 100]` before weighting, so the combined score
    /// stays bounded regardless of input.
    #[must_use]
    pub fn from_components(components: &[(&str, f64, f64)]) -> Self {
        let mut breakdown = Breakdown::new();
        let mut total = 0.0;
        for (name, weight, value) in components {
            let value = bounded(*value, 100.0);
            breakdown.insert((*name).to_string(), value);
            total += weight * value;
        }
        Self {
            score: to_score(total),
            breakdown,
        }
    }
}

/// A weighted, source-tagged sub-score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    /// Which source this is
    pub source: Source,
    /// Bounded score in `[0, 100]`
    pub score: u8,
    /// Sub-metric breakdown (empty when no data)
    pub breakdown: Breakdown,
    /// Top-level weight assigned by the aggregator configuration
    pub weight: f64,
    /// Data availability
    pub status: DataStatus,
}

impl SubScore {
    /// Sub-score computed from fetched data
    #[must_use]
    pub fn scored(source: Source, card: ScoreCard, weight: f64) -> Self {
        Self {
            source,
            score: card.score,
            breakdown: card.breakdown,
            weight,
            status: DataStatus::Available,
        }
    }

    /// Zero sub-score for a source with no usable data
    #[must_use]
    pub fn no_data(source: Source, weight: f64, status: DataStatus) -> Self {
        Self {
            source,
            score: 0,
            breakdown: Breakdown::new(),
            weight,
            status,
        }
    }

    /// Weighted contribution to the total score
    #[must_use]
    pub fn contribution(&self) -> f64 {
        f64::from(self.score) * self.weight
    }
}

/// The externally visible result of a scoring request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditResult {
    /// Weighted total in `[0, 100]`
    pub total_score: u8,
    /// One entry per source, in [`Source::ALL`] order
    pub sub_scores: Vec<SubScore>,
    /// Credit tier of the total score
    pub tier: CreditTier,
    /// Funding decision
    pub eligibility: Eligibility,
    /// Advisory improvement actions
    pub recommendations: Vec<Recommendation>,
    /// When the result was computed
    pub computed_at: DateTime<Utc>,
}

impl CreditResult {
    /// Sub-score for `source`
    #[must_use]
    pub fn sub_score(&self, source: Source) -> Option<&SubScore> {
        self.sub_scores.iter().find(|s| s.source == source)
    }

    /// Payload for the external disbursement collaborator
    #[must_use]
    pub fn funding_request(&self, developer_address: &str) -> FundingRequest {
        FundingRequest {
            eligible: self.eligibility.eligible,
            amount: self.eligibility.amount,
            developer_address: developer_address.to_string(),
        }
    }
}

/// What the funding API forwards to the disbursement collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRequest {
    /// Whether funding may be disbursed
    pub eligible: bool,
    /// Amount in whole currency units
    pub amount: u64,
    /// Receiving wallet
    pub developer_address: String,
}

/// Clamp `value` into `[0, cap]`, mapping non-finite input to zero
#[must_use]
pub fn bounded(value: f64, cap: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, cap)
    } else {
        0.0
    }
}

/// Round to the nearest integer score in `[0, 100]`
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_score(value: f64) -> u8 {
    bounded(value, 100.0).round() as u8
}
