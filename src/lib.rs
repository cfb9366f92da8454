//! Developer credit scoring
//!
//! Scores a developer's creditworthiness from public activity on GitHub,
//! Farcaster, Lens and an Ethereum wallet.
//!
//! # Features
//!
//! - **Fetch layer**: in-memory TTL cache, request coalescing, retries with
//!   exponential backoff, per-attempt timeouts and cancellation
//! - **Source adapters**: one per upstream API, each producing a canonical
//!   activity record
//! - **Engine**: concurrent fetches, graceful degradation when a source fails,
//!   weighted aggregation into a tiered [`credit_core::CreditResult`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod failsafe;
pub mod fetch;
pub mod sources;

pub use credit_core;
pub use engine::{CreditEngine, ProfileBundle};
pub use error::{Error, FetchError, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Returns [`Error::Config`] if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| Error::Config(format!("tracing: {e}")))
}
