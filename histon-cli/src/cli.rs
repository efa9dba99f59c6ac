//! CLI argument definitions.
//!
//! Uses `clap` v4 derive macros. Every subcommand shares the global
//! `--config` / `--log-level` / `--json` options.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Output rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default).
    Text,
    /// Machine-readable JSON.
    Json,
}

/// histon command-history service CLI.
#[derive(Parser, Debug)]
#[command(name = "histon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to histon.toml configuration file.
    #[arg(short, long, global = true, default_value = "/etc/histon/histon.toml")]
    pub config: PathBuf,

    /// Log level for CLI diagnostics (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

impl Cli {
    /// Resolve the output format from flags.
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the histon daemon (collects history into spool and database).
    Serve(ServeArgs),
    /// Import a legacy history file into the database.
    Import(ImportArgs),
    /// Export collected history as a grep-friendly stream.
    Export(ExportArgs),
    /// Create an API key for a tenant.
    ApiKey(ApiKeyArgs),
    /// Validate and display the configuration.
    Config(ConfigArgs),
}

/// Arguments for `histon serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Run in the background as a detached process.
    #[arg(short, long)]
    pub daemonize: bool,

    /// PID file path for background mode.
    #[arg(long)]
    pub pid_file: Option<PathBuf>,

    /// Validate the configuration and exit without starting the daemon.
    ///
    /// Implies foreground mode.
    #[arg(long)]
    pub validate: bool,
}

/// Arguments for `histon import`.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Tenant UUID to import into.
    #[arg(long)]
    pub tenant: String,

    /// History file to import.
    pub file: PathBuf,
}

/// Arguments for `histon export`.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Export endpoint base URL (e.g. "http://127.0.0.1:7080").
    #[arg(long, default_value = "http://127.0.0.1:7080")]
    pub server: String,

    /// Filter patterns, ANDed together (repeat up to 3 times).
    #[arg(long = "grep", action = clap::ArgAction::Append)]
    pub grep: Vec<String>,

    /// Session id equality filter.
    #[arg(long)]
    pub session: Option<String>,

    /// Sort order (ingest_asc, ingest_desc, client_asc, client_desc).
    #[arg(long)]
    pub order: Option<String>,

    /// Highlight matches with ANSI colors (never, always).
    #[arg(long)]
    pub color: Option<String>,

    /// Maximum number of rows.
    #[arg(long)]
    pub limit: Option<u64>,

    /// Bearer API key ("key_id.secret") for the apikey auth mode.
    #[arg(long)]
    pub api_key: Option<String>,
}

/// Arguments for `histon api-key`.
#[derive(Args, Debug, Clone)]
pub struct ApiKeyArgs {
    /// Tenant UUID the key belongs to.
    #[arg(long)]
    pub tenant: String,

    /// Optional user UUID to associate with the key.
    #[arg(long)]
    pub user: Option<String>,
}

/// Arguments for `histon config`.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Only validate; do not print the effective configuration.
    #[arg(long)]
    pub check: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve() {
        let cli = Cli::parse_from(["histon", "serve", "-d"]);
        match cli.command {
            Commands::Serve(args) => {
                assert!(args.daemonize);
                assert!(!args.validate);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_serve_validate() {
        let cli = Cli::parse_from(["histon", "serve", "--validate"]);
        match cli.command {
            Commands::Serve(args) => assert!(args.validate),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_export_with_repeated_grep() {
        let cli = Cli::parse_from([
            "histon", "export", "--grep", "ssh", "--grep", "root", "--limit", "10",
        ]);
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.grep, vec!["ssh", "root"]);
                assert_eq!(args.limit, Some(10));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_json_flag() {
        let cli = Cli::parse_from(["histon", "--json", "config"]);
        assert_eq!(cli.output_format(), OutputFormat::Json);
    }

    #[test]
    fn parses_import() {
        let cli = Cli::parse_from([
            "histon",
            "import",
            "--tenant",
            "0b6f3c8e-1df2-4a5b-9c0d-6e7f8a9b0c1d",
            "history.txt",
        ]);
        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.file, PathBuf::from("history.txt"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
