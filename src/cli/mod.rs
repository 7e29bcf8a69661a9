//! Command-line interface implementation
//!
//! Parses arguments with clap and dispatches to the command functions in
//! [`build`].

mod build;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// assetflow - front-end asset builds and a live-reload dev proxy
#[derive(Parser)]
#[command(name = "assetflow")]
#[command(about = "Build stylesheets, scripts and images, and proxy a dev server with live reload")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options accepted by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to assetflow.toml (default: searched upwards from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Rebuild outputs even when they are up to date
    #[arg(long, global = true)]
    pub force: bool,

    /// Report progress as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean, then build everything for production (the default)
    Build {
        /// Print the execution plan without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Build for development and proxy the dev host with live reload
    Serve {
        /// Override the local port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Build for production and proxy the production host
    ServeDist,

    /// Run named tasks and everything they depend on
    Run {
        /// Task names (see `assetflow tasks`)
        #[arg(required = true)]
        tasks: Vec<String>,

        /// Run in production mode
        #[arg(long)]
        production: bool,

        /// Print the execution plan without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// List tasks and what they depend on
    Tasks,
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let global = cli.global;

    match cli.command.unwrap_or(Commands::Build { dry_run: false }) {
        Commands::Build { dry_run } => build::run_default(&global, dry_run),
        Commands::Serve { port } => build::run_serve(&global, port),
        Commands::ServeDist => build::run_serve_dist(&global),
        Commands::Run { tasks, production, dry_run } => {
            build::run_named(&global, &tasks, production, dry_run)
        }
        Commands::Tasks => build::run_list(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_defaults_to_build() {
        let cli = Cli::try_parse_from(["assetflow"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["assetflow", "run", "styles", "scripts", "--production", "-v", "--force"])
            .unwrap();
        assert!(cli.global.verbose);
        assert!(cli.global.force);
        match cli.command {
            Some(Commands::Run { tasks, production, dry_run }) => {
                assert_eq!(tasks, vec!["styles", "scripts"]);
                assert!(production);
                assert!(!dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_requires_a_task() {
        let err = Cli::try_parse_from(["assetflow", "run"]).err().unwrap();
        assert_eq!(err.exit_code(), i32::from(EXIT_INVALID_ARGS));
    }
}
