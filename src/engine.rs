//! Credit engine
//!
//! Entry point of the pipeline: fetches every connected source concurrently,
//! scores what arrived, and aggregates the sub-scores into a [`CreditResult`].
//! A failed source degrades only its own sub-score.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use credit_core::scorers::{self, IdentityInputs};
use credit_core::{
    Aggregator, CreditResult, DataStatus, FarcasterActivity, GithubActivity, LensActivity,
    OnChainActivity, ScoreCard, Source, SubScore,
};

use crate::config::Config;
use crate::error::FetchError;
use crate::fetch::{DataKind, FetchCache};
use crate::sources::{ActivitySource, FarcasterSource, GithubSource, LensSource, OnChainSource};
use crate::{Error, Result};

/// Shared adapter producing records of type `R`
pub type SourceHandle<R> = Arc<dyn ActivitySource<Record = R>>;

/// Identities of one developer; absent fields are not connected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileBundle {
    /// GitHub login
    pub github: Option<String>,
    /// Farcaster username
    pub farcaster: Option<String>,
    /// Lens handle
    pub lens: Option<String>,
    /// Wallet address
    pub wallet: Option<String>,
}

impl ProfileBundle {
    fn identities(&self) -> [Option<&str>; 4] {
        [
            self.github.as_deref(),
            self.farcaster.as_deref(),
            self.lens.as_deref(),
            self.wallet.as_deref(),
        ]
        .map(|id| id.map(str::trim).filter(|id| !id.is_empty()))
    }

    /// `true` when no identity is supplied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities().iter().all(Option::is_none)
    }

    /// Result-cache key; case and surrounding whitespace do not matter
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        for id in self.identities() {
            hasher.update(id.map(str::to_lowercase).unwrap_or_default().as_bytes());
            hasher.update([0u8]);
        }
        format!(
            "credit:{}:{}",
            hex::encode(hasher.finalize()),
            DataKind::CreditResult
        )
    }
}

enum Outcome<R> {
    Missing,
    Failed(FetchError),
    Fetched(R),
}

impl<R> Outcome<R> {
    fn record(&self) -> Option<&R> {
        match self {
            Self::Fetched(record) => Some(record),
            _ => None,
        }
    }

    fn is_connected(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// Scoring pipeline over the configured adapters
pub struct CreditEngine {
    cache: FetchCache,
    aggregator: Aggregator,
    github: Option<SourceHandle<GithubActivity>>,
    farcaster: Option<SourceHandle<FarcasterActivity>>,
    lens: Option<SourceHandle<LensActivity>>,
    onchain: Option<SourceHandle<OnChainActivity>>,
}

impl CreditEngine {
    /// Engine without adapters; every source reports not connected until one is attached
    #[must_use]
    pub fn new(cache: FetchCache, aggregator: Aggregator) -> Self {
        Self {
            cache,
            aggregator,
            github: None,
            farcaster: None,
            lens: None,
            onchain: None,
        }
    }

    /// Attach the GitHub adapter
    #[must_use]
    pub fn with_github(mut self, source: SourceHandle<GithubActivity>) -> Self {
        self.github = Some(source);
        self
    }

    /// Attach the Farcaster adapter
    #[must_use]
    pub fn with_farcaster(mut self, source: SourceHandle<FarcasterActivity>) -> Self {
        self.farcaster = Some(source);
        self
    }

    /// Attach the Lens adapter
    #[must_use]
    pub fn with_lens(mut self, source: SourceHandle<LensActivity>) -> Self {
        self.lens = Some(source);
        self
    }

    /// Attach the on-chain adapter
    #[must_use]
    pub fn with_onchain(mut self, source: SourceHandle<OnChainActivity>) -> Self {
        self.onchain = Some(source);
        self
    }

    /// Build the engine and every enabled adapter from configuration.
    ///
    /// Farcaster without an API key is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &Config, cache: FetchCache) -> Result<Self> {
        let sources = &config.sources;
        let mut engine = Self::new(cache.clone(), config.aggregator());

        if sources.github.enabled {
            let github = GithubSource::new(&sources.github, cache.clone())?;
            engine = engine.with_github(Arc::new(github));
        }
        if sources.farcaster.enabled {
            match FarcasterSource::new(&sources.farcaster, cache.clone()) {
                Ok(source) => engine = engine.with_farcaster(Arc::new(source)),
                Err(Error::Config(reason)) => warn!(%reason, "Farcaster adapter disabled"),
                Err(e) => return Err(e),
            }
        }
        if sources.lens.enabled {
            engine = engine.with_lens(Arc::new(LensSource::new(&sources.lens, cache.clone())?));
        }
        if sources.onchain.enabled {
            engine = engine.with_onchain(Arc::new(OnChainSource::new(&sources.onchain, cache)?));
        }

        Ok(engine)
    }

    /// Shared fetch cache
    #[must_use]
    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Aggregation settings in use
    #[must_use]
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Score a developer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllSourcesFailed`] when every connected source failed.
    pub async fn calculate_credit_score(&self, bundle: &ProfileBundle) -> Result<CreditResult> {
        self.calculate_with_cancel(bundle, CancellationToken::new()).await
    }

    /// Score a developer, giving up when `cancel` fires.
    ///
    /// Cancelling abandons this request only; fetches shared with other
    /// requests keep running and still populate the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllSourcesFailed`] when every connected source failed,
    /// or [`FetchError::Cancelled`] when `cancel` fired.
    pub async fn calculate_with_cancel(
        &self,
        bundle: &ProfileBundle,
        cancel: CancellationToken,
    ) -> Result<CreditResult> {
        let key = bundle.cache_key();
        if let Some(result) = self.cache.peek::<CreditResult>(&key) {
            debug!(key = %key, "Credit result cache hit");
            return Ok(result);
        }

        let request_id = format!("cs-{}", Uuid::new_v4());
        let span = info_span!("credit_score", request_id = %request_id);
        self.calculate(bundle, &key, cancel).instrument(span).await
    }

    async fn calculate(
        &self,
        bundle: &ProfileBundle,
        key: &str,
        cancel: CancellationToken,
    ) -> Result<CreditResult> {
        let [github_id, farcaster_id, lens_id, wallet] = bundle.identities();

        let (github, farcaster, lens, onchain) = tokio::join!(
            fetch_outcome(self.github.as_ref(), github_id, &cancel),
            fetch_outcome(self.farcaster.as_ref(), farcaster_id, &cancel),
            fetch_outcome(self.lens.as_ref(), lens_id, &cancel),
            fetch_outcome(self.onchain.as_ref(), wallet, &cancel),
        );

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled.into());
        }

        let connected = [
            github.is_connected(),
            farcaster.is_connected(),
            lens.is_connected(),
            onchain.is_connected(),
        ]
        .into_iter()
        .filter(|c| *c)
        .count();

        let mut failures = Vec::new();
        let mut sub_scores = vec![
            self.score(Source::GitHub, &github, scorers::github::score, &mut failures),
            self.score(Source::Farcaster, &farcaster, scorers::farcaster::score, &mut failures),
            self.score(Source::Lens, &lens, scorers::lens::score, &mut failures),
            self.score(Source::OnChain, &onchain, scorers::onchain::score, &mut failures),
        ];

        if connected > 0 && failures.len() == connected {
            return Err(Error::AllSourcesFailed(failures));
        }

        let inputs = IdentityInputs {
            github: github.record(),
            farcaster: farcaster.record(),
            lens: lens.record(),
            onchain: onchain.record(),
        };
        sub_scores.push(if inputs.is_empty() {
            self.aggregator.missing(Source::Identity, DataStatus::NotConnected)
        } else {
            self.aggregator.sub_score(Source::Identity, scorers::identity::score(&inputs))
        });

        let result = self.aggregator.aggregate(&sub_scores, Utc::now());
        info!(
            total = result.total_score,
            tier = %result.tier,
            eligible = result.eligibility.eligible,
            degraded = failures.len(),
            "Credit score computed"
        );

        if failures.is_empty() {
            self.cache.store(key, result.clone(), DataKind::CreditResult);
        }
        Ok(result)
    }

    fn score<R>(
        &self,
        source: Source,
        outcome: &Outcome<R>,
        scorer: fn(&R) -> ScoreCard,
        failures: &mut Vec<String>,
    ) -> SubScore {
        match outcome {
            Outcome::Missing => self.aggregator.missing(source, DataStatus::NotConnected),
            Outcome::Fetched(record) => self.aggregator.sub_score(source, scorer(record)),
            Outcome::Failed(err) => {
                let reason = err.to_string();
                let err = Error::SourceUnavailable(source, reason.clone());
                warn!(source = %source, error = %err, "Source degraded");
                failures.push(err.to_string());
                self.aggregator.missing(source, DataStatus::Unavailable(reason))
            }
        }
    }
}

async fn fetch_outcome<R>(
    adapter: Option<&SourceHandle<R>>,
    identity: Option<&str>,
    cancel: &CancellationToken,
) -> Outcome<R>
where
    R: Clone + Send + Sync + 'static,
{
    let (Some(adapter), Some(identity)) = (adapter, identity) else {
        return Outcome::Missing;
    };
    match adapter.fetch_activity(identity, cancel.child_token()).await {
        Ok(record) => Outcome::Fetched(record),
        Err(err) => Outcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_ignores_case_and_whitespace() {
        let a = ProfileBundle {
            github: Some("Octocat".into()),
            wallet: Some(" 0xABC ".into()),
            ..Default::default()
        };
        let b = ProfileBundle {
            github: Some("octocat".into()),
            wallet: Some("0xabc".into()),
            ..Default::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().starts_with("credit:"));
        assert!(a.cache_key().ends_with(":credit_result"));
    }

    #[test]
    fn test_cache_key_distinguishes_fields() {
        let github = ProfileBundle {
            github: Some("alice".into()),
            ..Default::default()
        };
        let lens = ProfileBundle {
            lens: Some("alice".into()),
            ..Default::default()
        };
        assert_ne!(github.cache_key(), lens.cache_key());
    }

    #[test]
    fn test_blank_identities_are_empty() {
        let bundle = ProfileBundle {
            github: Some("  ".into()),
            ..Default::default()
        };
        assert!(bundle.is_empty());
        assert!(ProfileBundle::default().is_empty());
    }
}
