//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use credit_core::{Aggregator, FundingPolicy, RecommendationPolicy, Weights};

use crate::fetch::DataKind;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Fetch layer: timeouts, retries, backoff and cache lifetimes
    pub fetch: FetchConfig,
    /// Upstream data sources
    pub sources: SourcesConfig,
    /// Weights and recommendation thresholds
    pub scoring: ScoringConfig,
    /// Funding rules
    pub funding: FundingPolicy,
}

/// Fetch layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Time budget of a single attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retries after the first attempt
    pub retries: u32,
    /// Base unit of the exponential backoff
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier applied when the upstream reports rate limiting
    pub rate_limit_backoff_multiplier: u32,
    /// Count a timed-out attempt as retryable instead of terminal
    pub retry_on_timeout: bool,
    /// Cache lifetime per data kind
    pub ttl: TtlConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            backoff_base: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            rate_limit_backoff_multiplier: 4,
            retry_on_timeout: false,
            ttl: TtlConfig::default(),
        }
    }
}

/// Cache lifetime of each [`DataKind`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Repository metadata
    #[serde(with = "humantime_serde")]
    pub repo_metadata: Duration,
    /// Issue and pull request listings
    #[serde(with = "humantime_serde")]
    pub issue_list: Duration,
    /// Account profiles
    #[serde(with = "humantime_serde")]
    pub profile: Duration,
    /// Social posting activity
    #[serde(with = "humantime_serde")]
    pub social_activity: Duration,
    /// Wallet transaction history
    #[serde(with = "humantime_serde")]
    pub chain_activity: Duration,
    /// Finished credit results
    #[serde(with = "humantime_serde")]
    pub credit_result: Duration,
    /// Anything else
    #[serde(with = "humantime_serde")]
    pub generic: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            repo_metadata: Duration::from_secs(24 * 3600),
            issue_list: Duration::from_secs(3600),
            profile: Duration::from_secs(3600),
            social_activity: Duration::from_secs(15 * 60),
            chain_activity: Duration::from_secs(10 * 60),
            credit_result: Duration::from_secs(5 * 60),
            generic: Duration::from_secs(5 * 60),
        }
    }
}

impl TtlConfig {
    /// Lifetime for `kind`
    #[must_use]
    pub fn ttl(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::RepoMetadata => self.repo_metadata,
            DataKind::IssueList => self.issue_list,
            DataKind::Profile => self.profile,
            DataKind::SocialActivity => self.social_activity,
            DataKind::ChainActivity => self.chain_activity,
            DataKind::CreditResult => self.credit_result,
            DataKind::Generic => self.generic,
        }
    }
}

/// Upstream source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// GitHub REST API
    pub github: SourceConfig,
    /// Neynar Farcaster API
    pub farcaster: SourceConfig,
    /// Lens GraphQL API
    pub lens: SourceConfig,
    /// Etherscan-compatible block explorer
    pub onchain: SourceConfig,
}

/// Settings for one upstream API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Whether the source is queried at all
    pub enabled: bool,
    /// Override of the adapter's default endpoint
    pub base_url: Option<String>,
    /// Credential (supports `env:VAR_NAME` and `${VAR:-default}`)
    pub api_key: Option<String>,
    /// Sustained request rate
    pub requests_per_second: u32,
    /// Requests allowed in a burst
    pub burst_size: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            api_key: None,
            requests_per_second: 5,
            burst_size: 10,
        }
    }
}

impl SourceConfig {
    /// Resolve the credential, reading `env:VAR_NAME` references.
    /// Empty values count as absent.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        let key = self.api_key.as_ref()?;
        let resolved = match key.strip_prefix("env:") {
            Some(var_name) => env::var(var_name).ok()?,
            None => key.clone(),
        };
        (!resolved.is_empty()).then_some(resolved)
    }

    /// Configured endpoint, or `default` without a trailing slash
    #[must_use]
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Per-source weights of the total score
    pub weights: Weights,
    /// Sub-score thresholds below which a recommendation is emitted
    pub recommendations: RecommendationPolicy,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed or
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("DEVCREDIT_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files first so ${VAR} expansion can see their values
        config.load_env_files();
        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the engine cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.aggregator().check().map_err(Error::Config)?;

        if self.fetch.timeout.is_zero() {
            return Err(Error::Config("fetch.timeout must be greater than zero".into()));
        }
        if self.fetch.retries > 10 {
            return Err(Error::Config(format!(
                "fetch.retries must be at most 10, got {}",
                self.fetch.retries
            )));
        }
        if self.fetch.rate_limit_backoff_multiplier == 0 {
            return Err(Error::Config(
                "fetch.rate_limit_backoff_multiplier must be at least 1".into(),
            ));
        }
        for (name, source) in self.sources.iter() {
            if source.enabled && source.requests_per_second == 0 {
                return Err(Error::Config(format!(
                    "sources.{name}.requests_per_second must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Aggregation engine configured from the `scoring` and `funding` sections
    #[must_use]
    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(
            self.scoring.weights.clone(),
            self.funding.clone(),
            self.scoring.recommendations.clone(),
        )
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in credentials and endpoints
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Config(e.to_string()))?;

        for source in self.sources.iter_mut() {
            for value in [&mut source.api_key, &mut source.base_url]
                .into_iter()
                .flatten()
            {
                *value = expand_string(&re, value);
            }
        }
        Ok(())
    }
}

impl SourcesConfig {
    /// Every source section with its key
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &SourceConfig)> {
        [
            ("github", &self.github),
            ("farcaster", &self.farcaster),
            ("lens", &self.lens),
            ("onchain", &self.onchain),
        ]
        .into_iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut SourceConfig> {
        [
            &mut self.github,
            &mut self.farcaster,
            &mut self.lens,
            &mut self.onchain,
        ]
        .into_iter()
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
        _ => path.to_string(),
    }
}

/// Expand environment variables in a string
fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string ("30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize a human-readable duration ("250ms", "30s", "5m", "24h").
    /// A bare number is taken as seconds.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    /// Parse a duration string
    ///
    /// # Errors
    ///
    /// Returns a description of the malformed input.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let number = |digits: &str| {
            digits
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid duration {s:?}: {e}"))
        };

        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins).map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            number(hours).map(|h| Duration::from_secs(h * 3600))
        } else {
            number(s).map(Duration::from_secs)
        }
    }
}
