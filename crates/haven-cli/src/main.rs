//! `haven` -- CLI binary for the haven request orchestrator.
//!
//! Provides the following subcommands:
//!
//! - `haven query` -- Run one query through the full orchestration flow.
//! - `haven screen` -- Show the safety gate verdict and crisis score.
//! - `haven route` -- Show the routing decision for a query.
//! - `haven config` -- Show the resolved configuration.
//!
//! Model calls are served by a scripted provider, so every command runs
//! offline.

use clap::{Parser, Subcommand};

mod commands;
mod config_loader;

/// haven request orchestrator CLI.
#[derive(Parser)]
#[command(name = "haven", about = "haven request orchestrator CLI", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run a query through the safety gate, router and fallback chain.
    Query(commands::query::QueryArgs),

    /// Screen text with the safety gate only.
    Screen(commands::screen::ScreenArgs),

    /// Show the routing decision for a query.
    Route(commands::route::RouteArgs),

    /// Show resolved configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

/// Subcommands for `haven config`.
#[derive(Subcommand)]
enum ConfigCmd {
    /// Show the full resolved configuration.
    Show,

    /// Show a specific configuration section.
    Section {
        /// Section name (e.g., "dispatcher", "safety", "orchestrator").
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = config_loader::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Query(args) => commands::query::run(args, config).await?,
        Commands::Screen(args) => commands::screen::run(args, config).await?,
        Commands::Route(args) => commands::route::run(args, config)?,
        Commands::Config { action } => match action {
            ConfigCmd::Show => commands::config_cmd::show(&config)?,
            ConfigCmd::Section { name } => commands::config_cmd::show_section(&config, &name)?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_args_parse() {
        let cli = Cli::try_parse_from([
            "haven",
            "--verbose",
            "query",
            "hello",
            "--user",
            "u1",
            "--risk-level",
            "high",
            "--consent-to-train",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.text, "hello");
                assert_eq!(args.user.user, "u1");
                assert!(args.consent_to_train);
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["haven", "config", "show", "--config", "/tmp/h.json"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/h.json"));
    }

    #[test]
    fn unknown_risk_level_is_rejected() {
        let result = Cli::try_parse_from(["haven", "screen", "hi", "--risk-level", "extreme"]);
        assert!(result.is_err());
    }
}
