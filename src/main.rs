//! devcredit - developer credit scoring from public activity

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use devcredit::{
    CreditEngine,
    cli::{Cli, Command, ConfigCommand, OutputFormat, ScoreArgs},
    config::Config,
    credit_core::{CreditResult, DataStatus},
    fetch::FetchCache,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Command::Score(args) => run_score(&config, &args).await,
        Command::Config(ConfigCommand::Check) => run_config_check(&config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Score one developer and print the result
async fn run_score(config: &Config, args: &ScoreArgs) -> anyhow::Result<()> {
    let bundle = args.bundle();
    if bundle.is_empty() {
        anyhow::bail!("at least one of --github, --farcaster, --lens or --wallet is required");
    }

    let cache = FetchCache::new(config.fetch.clone());
    let engine =
        CreditEngine::from_config(config, cache.clone()).context("failed to build adapters")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Scoring developer");
    let result = engine.calculate_credit_score(&bundle).await;
    cache.shutdown();
    let result = result.context("scoring failed")?;

    match args.format {
        OutputFormat::Json => {
            let mut output = serde_json::to_value(&result)?;
            if let Some(address) = &args.address {
                output["funding_request"] = serde_json::to_value(result.funding_request(address))?;
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => print_text(&result, args.address.as_deref()),
    }
    Ok(())
}

fn print_text(result: &CreditResult, address: Option<&str>) {
    println!("Credit score: {} ({})", result.total_score, result.tier);
    println!();
    for sub in &result.sub_scores {
        let status = match &sub.status {
            DataStatus::Available => String::new(),
            DataStatus::NotConnected => " - not connected".to_string(),
            DataStatus::Unavailable(reason) => format!(" - unavailable: {reason}"),
        };
        println!(
            "  {:<10} {:>3}  x {:.2}{status}",
            sub.source.label(),
            sub.score,
            sub.weight
        );
    }
    println!();

    let eligibility = &result.eligibility;
    if eligibility.eligible {
        println!(
            "Eligible for {} at {:.1}% ({})",
            eligibility.amount, eligibility.interest_rate, eligibility.repayment_terms
        );
    } else {
        println!("Not eligible for funding");
    }
    for condition in &eligibility.conditions {
        println!("  - {condition}");
    }

    if !result.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for rec in &result.recommendations {
            println!("  [{:?}] {}", rec.priority, rec.action);
        }
    }

    if let Some(address) = address {
        let request = result.funding_request(address);
        println!();
        println!(
            "Funding request: eligible={} amount={} address={}",
            request.eligible, request.amount, request.developer_address
        );
    }
}

/// Validate configuration and print the effective scoring settings
fn run_config_check(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    println!("Configuration OK");
    println!();
    println!("{}", serde_yaml::to_string(&config.scoring)?);
    println!("Sources:");
    for (name, source) in config.sources.iter() {
        let state = if source.enabled { "enabled" } else { "disabled" };
        println!("  {name:<10} {state}");
    }
    Ok(())
}
