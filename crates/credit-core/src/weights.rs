//! Top-level source weights

use serde::{Deserialize, Serialize};

use crate::model::Source;

/// Allowed deviation of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Per-source weights of the total score.
///
/// Missing sources keep their weight and contribute zero; weights are never
/// renormalized over the sources that happened to respond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    /// Code hosting
    pub github: f64,
    /// Farcaster
    pub farcaster: f64,
    /// Lens
    pub lens: f64,
    /// Wallet activity
    pub onchain: f64,
    /// Identity consistency
    pub identity: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            github: 0.40,
            farcaster: 0.15,
            lens: 0.15,
            onchain: 0.20,
            identity: 0.10,
        }
    }
}

impl Weights {
    /// Weight of `source`
    #[must_use]
    pub fn weight(&self, source: Source) -> f64 {
        match source {
            Source::GitHub => self.github,
            Source::Farcaster => self.farcaster,
            Source::Lens => self.lens,
            Source::OnChain => self.onchain,
            Source::Identity => self.identity,
        }
    }

    /// Sum of all weights
    #[must_use]
    pub fn sum(&self) -> f64 {
        Source::ALL.iter().map(|s| self.weight(*s)).sum()
    }

    /// Check that every weight is a finite non-negative number and that they sum to 1.0
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn check(&self) -> Result<(), String> {
        for source in Source::ALL {
            let w = self.weight(source);
            if !w.is_finite() || w < 0.0 {
                return Err(format!(
                    "weight for {} must be a non-negative number, got {w}",
                    source.key()
                ));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("source weights must sum to 1.0, got {sum:.4}"));
        }
        Ok(())
    }
}
