//! Credit tiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete creditworthiness bucket. Declared lowest first, so `Ord` follows
/// creditworthiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditTier {
    /// Below 25
    Unqualified,
    /// 25-39
    Limited,
    /// 40-54
    Fair,
    /// 55-69
    Good,
    /// 70-84
    Excellent,
    /// 85 and above
    Premium,
}

impl CreditTier {
    /// Every tier, lowest first
    pub const ALL: [CreditTier; 6] = [
        CreditTier::Unqualified,
        CreditTier::Limited,
        CreditTier::Fair,
        CreditTier::Good,
        CreditTier::Excellent,
        CreditTier::Premium,
    ];

    /// Map a total score to its tier. Lower bounds are inclusive.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            85..=u8::MAX => Self::Premium,
            70..=84 => Self::Excellent,
            55..=69 => Self::Good,
            40..=54 => Self::Fair,
            25..=39 => Self::Limited,
            _ => Self::Unqualified,
        }
    }

    /// Inclusive lower bound of the tier
    #[must_use]
    pub fn min_score(self) -> u8 {
        match self {
            Self::Premium => 85,
            Self::Excellent => 70,
            Self::Good => 55,
            Self::Fair => 40,
            Self::Limited => 25,
            Self::Unqualified => 0,
        }
    }

    /// Annual interest rate in percent. Lower tiers pay more.
    #[must_use]
    pub fn interest_rate(self) -> f64 {
        match self {
            Self::Premium => 3.0,
            Self::Excellent => 5.0,
            Self::Good => 8.0,
            Self::Fair => 12.0,
            Self::Limited => 18.0,
            Self::Unqualified => 0.0,
        }
    }

    /// Repayment terms offered at this tier
    #[must_use]
    pub fn repayment_terms(self) -> &'static str {
        match self {
            Self::Premium => "24 months, 6-month grace period",
            Self::Excellent => "18 months, 3-month grace period",
            Self::Good => "12 months, 1-month grace period",
            Self::Fair => "9 months, no grace period",
            Self::Limited => "6 months, no grace period",
            Self::Unqualified => "not applicable",
        }
    }

    /// Human-readable name
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Premium => "Premium",
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Limited => "Limited",
            Self::Unqualified => "Unqualified",
        }
    }
}

impl fmt::Display for CreditTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
