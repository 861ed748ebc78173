use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};
use hookwise::env::HOOKWISE_LOG;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging goes to stderr; stdout is reserved for hook output.
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(HOOKWISE_LOG).unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Dispatch { event } => cli::dispatch::run(event, cli.rules.as_deref()),
        Commands::Rules => cli::rules::run(cli.rules.as_deref()),
    }
}
