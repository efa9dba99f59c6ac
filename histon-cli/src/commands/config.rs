//! `histon config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::cli::ConfigArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Summary payload for the config command.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    /// Path of the validated file.
    pub path: String,
    /// Whether validation passed (always true when rendered).
    pub valid: bool,
    /// Enabled ingest listeners.
    pub ingest_listeners: Vec<String>,
    /// Enabled export endpoints.
    pub export_endpoints: Vec<String>,
    /// Number of configured tenants.
    pub tenants: usize,
    /// Number of configured ACLs.
    pub acls: usize,
    /// Whether a database DSN is configured.
    pub database: bool,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "configuration OK: {}", self.path)?;
        writeln!(
            w,
            "ingest:  {}",
            if self.ingest_listeners.is_empty() {
                "(none)".to_owned()
            } else {
                self.ingest_listeners.join(", ")
            }
        )?;
        writeln!(
            w,
            "export:  {}",
            if self.export_endpoints.is_empty() {
                "(none)".to_owned()
            } else {
                self.export_endpoints.join(", ")
            }
        )?;
        writeln!(w, "tenants: {}", self.tenants)?;
        writeln!(w, "acls:    {}", self.acls)?;
        writeln!(w, "db:      {}", if self.database { "configured" } else { "none" })?;
        Ok(())
    }
}

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::import::load_config(config_path).await?;

    if args.check {
        println!("configuration OK: {}", config_path.display());
        return Ok(());
    }

    let mut ingest_listeners = Vec::new();
    if config.ingest.clear.enabled {
        ingest_listeners.push(format!("clear {}", config.ingest.clear.addr));
    }
    if config.ingest.tls.enabled {
        ingest_listeners.push(format!("tls {}", config.ingest.tls.addr));
    }

    let mut export_endpoints = Vec::new();
    if config.export.http.enabled {
        export_endpoints.push(format!("http {}", config.export.http.addr));
    }
    if config.export.https.enabled {
        export_endpoints.push(format!("https {}", config.export.https.addr));
    }

    writer.render(&ConfigReport {
        path: config_path.display().to_string(),
        valid: true,
        ingest_listeners,
        export_endpoints,
        tenants: config.tenant.len(),
        acls: config.acl.len(),
        database: !config.db.postgres_dsn.trim().is_empty(),
    })?;

    Ok(())
}
