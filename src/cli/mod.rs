//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to the command
//! handlers in [`build`].

mod build;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::build::Command;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// assetpipe - Compile stylesheets, bundle scripts and serve them with live reload
#[derive(Parser, Debug)]
#[command(name = "assetpipe")]
#[command(about = "Compile stylesheets, bundle scripts and serve them with live reload")]
#[command(version)]
pub struct Cli {
    /// Command to run (default: build, watch, serve and open a browser)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override file to use instead of searching for assetpipe.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Dev server port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Build, watch, serve and open a browser tab
    Default,
    /// Build, watch and serve without opening a browser
    Watch,
    /// One-shot production build
    Build,
    /// Serve the document root (or proxy) and open a browser tab
    Serve,
}

impl From<Commands> for Command {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Default => Command::Default,
            Commands::Watch => Command::Watch,
            Commands::Build => Command::Build,
            Commands::Serve => Command::Serve,
        }
    }
}

fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .try_init();
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(EXIT_INVALID_ARGS) } else { ExitCode::from(EXIT_SUCCESS) };
        }
    };
    setup_logging(cli.verbose);

    let command = cli.command.unwrap_or(Commands::Default);
    build::run_command(command.into(), cli.config.as_deref(), cli.port, cli.verbose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_is_default() {
        let cli = Cli::try_parse_from(["assetpipe"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(Command::from(cli.command.unwrap_or(Commands::Default)), Command::Default);
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["assetpipe", "build", "--port", "4000", "-v", "--config", "site.toml"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Build));
        assert_eq!(cli.port, Some(4000));
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(Cli::try_parse_from(["assetpipe", "deploy"]).is_err());
        assert!(Cli::try_parse_from(["assetpipe", "--port", "huge"]).is_err());
    }
}
