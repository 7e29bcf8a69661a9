//! assetflow - command-line front end for the asset pipeline

use std::process::ExitCode;

use assetflow::cli;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let verbose = std::env::args().skip(1).any(|a| a == "-v" || a == "--verbose");
    let default = if verbose { "assetflow=debug" } else { "assetflow=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();

    cli::run()
}
