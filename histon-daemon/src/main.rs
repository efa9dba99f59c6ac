//! histon-daemon entry point.
//!
//! Exit codes: 2 for CLI/config errors, 1 for runtime failures,
//! 0 for clean shutdown.

use clap::Parser;

use histon_core::HistonConfig;
use histon_daemon::cli::DaemonCli;
use histon_daemon::logging;
use histon_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() {
    let cli = DaemonCli::parse();

    let mut config = match HistonConfig::load(&cli.config).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("histon-daemon: {e}");
            std::process::exit(2);
        }
    };

    // CLI overrides take precedence over the config file
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(pid_file) = &cli.pid_file {
        config.general.pid_file = pid_file.clone();
    }

    if let Err(e) = config.validate() {
        eprintln!("histon-daemon: invalid configuration: {e}");
        std::process::exit(2);
    }

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return;
    }

    if let Err(e) = logging::init_tracing(&config.general) {
        eprintln!("histon-daemon: {e}");
        std::process::exit(2);
    }

    tracing::info!(config = %cli.config.display(), "histon-daemon starting");

    let mut orchestrator = match Orchestrator::build_from_config(config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize");
            std::process::exit(1);
        }
    };

    if let Err(e) = orchestrator.run().await {
        tracing::error!(error = %e, "daemon failed");
        std::process::exit(1);
    }

    tracing::info!("histon-daemon shut down");
}
