//! Command-line interface definitions.

pub mod config;
pub mod run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Poolkeeper - lifecycle and health management for pooled connections.
#[derive(Parser, Debug)]
#[command(name = "poolkeeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the lifecycle manager and log its events until interrupted
    Run(RunArgs),

    /// Print the effective lifecycle configuration as JSON
    Config(ConfigPathArg),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use JSON log format instead of pretty
    #[arg(long)]
    pub json_logs: bool,
}

/// Load the config file if one was given, otherwise use defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&PathBuf>) -> crate::error::Result<crate::config::Config> {
    match path {
        Some(path) => crate::config::Config::load(path),
        None => Ok(crate::config::Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::parse_from([
            "poolkeeper",
            "run",
            "--config",
            "pool.toml",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, Some(PathBuf::from("pool.toml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }

    #[test]
    fn config_path_is_optional() {
        let cli = Cli::parse_from(["poolkeeper", "config"]);
        let Commands::Config(arg) = cli.command else {
            panic!("expected config");
        };
        assert!(arg.config.is_none());
        assert_eq!(load_config(None).unwrap().lifecycle.max_connections_per_account, 3);
    }
}
