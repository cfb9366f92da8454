//! Per-request fetch options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

/// Kind of data being fetched; selects the default cache lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Repository metadata (slow-changing)
    RepoMetadata,
    /// Issue and pull request listings
    IssueList,
    /// Account profiles
    Profile,
    /// Posts, casts and reactions
    SocialActivity,
    /// Wallet transactions and balances
    ChainActivity,
    /// Computed credit results
    CreditResult,
    /// Anything else
    Generic,
}

impl DataKind {
    /// Stable name used in cache keys and metric labels
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepoMetadata => "repo_metadata",
            Self::IssueList => "issue_list",
            Self::Profile => "profile",
            Self::SocialActivity => "social_activity",
            Self::ChainActivity => "chain_activity",
            Self::CreditResult => "credit_result",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a validation hook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the value may be cached and returned
    pub is_valid: bool,
    /// Problems found
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// A passing report
    #[must_use]
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// Report built from a list of problems; valid when the list is empty
    #[must_use]
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Converts a raw response into the caller's type
pub type Transform<T> = Arc<dyn Fn(Value) -> Result<T, FetchError> + Send + Sync>;

/// Checks a transformed value before it is cached
pub type Validator<T> = Arc<dyn Fn(&T) -> ValidationReport + Send + Sync>;

/// Options for one [`FetchCache::fetch`](super::FetchCache::fetch) call.
///
/// Adapters build these once and reuse them for every request.
pub struct FetchOptions<T> {
    /// Data kind; picks the cache lifetime unless `ttl` is set
    pub kind: DataKind,
    /// Cache lifetime override
    pub ttl: Option<Duration>,
    /// Retry count override
    pub retries: Option<u32>,
    /// Per-attempt timeout override
    pub timeout: Option<Duration>,
    transform: Transform<T>,
    validate: Option<Validator<T>>,
}

impl<T> Clone for FetchOptions<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            ttl: self.ttl,
            retries: self.retries,
            timeout: self.timeout,
            transform: Arc::clone(&self.transform),
            validate: self.validate.clone(),
        }
    }
}

impl<T> fmt::Debug for FetchOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("kind", &self.kind)
            .field("ttl", &self.ttl)
            .field("retries", &self.retries)
            .field("timeout", &self.timeout)
            .field("validate", &self.validate.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> FetchOptions<T> {
    /// Options that deserialize the raw response into `T`
    #[must_use]
    pub fn new(kind: DataKind) -> Self {
        Self::with_transform(kind, |value| {
            serde_json::from_value(value)
                .map_err(|e| FetchError::validation(format!("unexpected response shape: {e}")))
        })
    }
}

impl<T> FetchOptions<T> {
    /// Options with a custom transform
    pub fn with_transform<F>(kind: DataKind, transform: F) -> Self
    where
        F: Fn(Value) -> Result<T, FetchError> + Send + Sync + 'static,
    {
        Self {
            kind,
            ttl: None,
            retries: None,
            timeout: None,
            transform: Arc::new(transform),
            validate: None,
        }
    }

    /// Override the cache lifetime
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Override the retry count
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Override the per-attempt timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a validation hook run after the transform
    #[must_use]
    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&T) -> ValidationReport + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// Transform then validate a raw response
    pub(crate) fn apply(&self, raw: Value) -> Result<T, FetchError> {
        let value = (self.transform)(raw)?;
        if let Some(validate) = &self.validate {
            let report = validate(&value);
            if !report.is_valid {
                return Err(FetchError::Validation(report.errors));
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Repo {
        name: String,
        stars: u32,
    }

    #[test]
    fn test_default_transform_deserializes() {
        let opts = FetchOptions::<Repo>::new(DataKind::RepoMetadata);
        let repo = opts.apply(json!({"name": "core", "stars": 4})).unwrap();
        assert_eq!(
            repo,
            Repo {
                name: "core".into(),
                stars: 4
            }
        );
    }

    #[test]
    fn test_shape_mismatch_is_validation_error() {
        let opts = FetchOptions::<Repo>::new(DataKind::RepoMetadata);
        let err = opts.apply(json!({"name": 3})).unwrap_err();
        assert!(matches!(err, FetchError::Validation(_)));
    }

    #[test]
    fn test_validate_hook_rejects() {
        let opts = FetchOptions::<Repo>::new(DataKind::RepoMetadata).validate(|repo| {
            if repo.name.is_empty() {
                ValidationReport::from_errors(vec!["name is empty".into()])
            } else {
                ValidationReport::ok()
            }
        });
        let err = opts.apply(json!({"name": "", "stars": 0})).unwrap_err();
        assert_eq!(err, FetchError::Validation(vec!["name is empty".into()]));
    }
}
