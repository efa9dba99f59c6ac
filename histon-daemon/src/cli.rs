//! CLI argument definitions for histon-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// histon command-history ingestion daemon.
///
/// Orchestrates the service modules (ingest pipeline, store writer,
/// export service) and manages their lifecycles.
#[derive(Parser, Debug)]
#[command(name = "histon-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to histon.toml configuration file.
    #[arg(short, long, default_value = "/etc/histon/histon.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let cli = DaemonCli::parse_from(["histon-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/histon/histon.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let cli = DaemonCli::parse_from([
            "histon-daemon",
            "--config",
            "/tmp/h.toml",
            "--log-level",
            "debug",
            "--validate",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/h.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.validate);
    }
}
