//! histon -- Command-line interface for the histon command-history service
//!
//! Provides commands to run the daemon, import legacy history files,
//! export collected history, create API keys and validate configuration.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod error;
mod output;

use cli::{Cli, Commands};
use error::CliError;
use output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing with minimal subscriber for CLI
    // Structured JSON would be noisy for interactive use, so we use compact format
    // Logs go to stderr, output goes to stdout
    let log_level = cli.log_level.as_deref().unwrap_or("warn");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let writer = OutputWriter::new(cli.output_format());

    let result: Result<(), CliError> = match &cli.command {
        Commands::Serve(args) => commands::serve::execute(args.clone(), &cli.config).await,
        Commands::Import(args) => {
            commands::import::execute(args.clone(), &cli.config, &writer).await
        }
        Commands::Export(args) => commands::export::execute(args.clone(), &cli.config).await,
        Commands::ApiKey(args) => {
            commands::api_key::execute(args.clone(), &cli.config, &writer).await
        }
        Commands::Config(args) => {
            commands::config::execute(args.clone(), &cli.config, &writer).await
        }
    };

    if let Err(e) = result {
        eprintln!("histon: {e}");
        std::process::exit(e.exit_code());
    }
}
