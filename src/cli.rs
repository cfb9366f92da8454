//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::engine::ProfileBundle;

/// Developer credit scoring from public activity
#[derive(Parser, Debug)]
#[command(name = "devcredit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "DEVCREDIT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "DEVCREDIT_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "DEVCREDIT_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the credit score of a developer
    Score(ScoreArgs),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Identities and output options for `score`
#[derive(clap::Args, Debug, Clone)]
pub struct ScoreArgs {
    /// GitHub login
    #[arg(long)]
    pub github: Option<String>,

    /// Farcaster username
    #[arg(long)]
    pub farcaster: Option<String>,

    /// Lens handle
    #[arg(long)]
    pub lens: Option<String>,

    /// Wallet address (0x...)
    #[arg(long)]
    pub wallet: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also print the funding request for this receiving address
    #[arg(long)]
    pub address: Option<String>,
}

impl ScoreArgs {
    /// Identities as a profile bundle
    #[must_use]
    pub fn bundle(&self) -> ProfileBundle {
        ProfileBundle {
            github: self.github.clone(),
            farcaster: self.farcaster.clone(),
            lens: self.lens.clone(),
            wallet: self.wallet.clone(),
        }
    }
}

/// Result rendering
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration and print the effective weights
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_score() {
        let cli = Cli::try_parse_from([
            "devcredit",
            "score",
            "--github",
            "octocat",
            "--wallet",
            "0xabc",
            "--format",
            "json",
        ])
        .unwrap();
        let Command::Score(args) = cli.command else {
            panic!("expected score");
        };
        assert_eq!(args.format, OutputFormat::Json);
        let bundle = args.bundle();
        assert_eq!(bundle.github.as_deref(), Some("octocat"));
        assert_eq!(bundle.farcaster, None);
    }

    #[test]
    fn test_parse_config_check_with_global_flags() {
        let cli = Cli::try_parse_from([
            "devcredit",
            "config",
            "check",
            "--config",
            "devcredit.yaml",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Check)));
        assert_eq!(cli.config, Some(PathBuf::from("devcredit.yaml")));
        assert_eq!(cli.log_format.as_deref(), Some("json"));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["devcredit"]).is_err());
    }
}
