//! Developer credit scoring core
//!
//! Pure, I/O-free building blocks of the credit pipeline:
//!
//! - **Activity records**: canonical per-source shapes produced by the adapters
//! - **Scorers**: `record -> ScoreCard` functions with individually capped sub-metrics
//! - **Aggregation**: weighted total, tier mapping, eligibility and recommendations
//!
//! Everything in this crate is deterministic: identical inputs always yield identical
//! outputs, which is what lets the service layer cache and replay results.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod activity;
pub mod aggregate;
pub mod eligibility;
pub mod model;
pub mod recommend;
pub mod scorers;
pub mod tier;
pub mod weights;

pub use activity::{
    FarcasterActivity, GithubActivity, LensActivity, OnChainActivity, PullRequestSummary,
    RepositorySummary,
};
pub use aggregate::Aggregator;
pub use eligibility::{Eligibility, FundingPolicy, TierAmounts};
pub use model::{
    Breakdown, Category, CreditResult, DataStatus, FundingRequest, Priority, ScoreCard, Source,
    SubScore,
};
pub use recommend::{Recommendation, RecommendationPolicy};
pub use tier::CreditTier;
pub use weights::Weights;
