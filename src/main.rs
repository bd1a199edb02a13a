//! stemeval CLI
//!
//! Command-line entry point for the separation baselines.

use clap::Parser;
use env_logger::Env;
use log::info;

use stemeval::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("stemeval v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Evaluate(args)) => commands::evaluate(&args),
        None => {
            println!("stemeval v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}
