//! `histon import` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use histon_core::HistonConfig;
use histon_store::{import_history_file, Db};

use crate::cli::ImportArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Result payload for the import command.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    /// Tenant the history was imported into.
    pub tenant_id: String,
    /// Imported file path.
    pub file: String,
    /// Rows newly inserted.
    pub inserted: u64,
    /// Rows skipped on `(tenant_id, seq)` conflict.
    pub skipped: u64,
}

impl Render for ImportReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "tenant:   {}", self.tenant_id)?;
        writeln!(w, "file:     {}", self.file)?;
        writeln!(w, "inserted: {}", self.inserted)?;
        writeln!(w, "skipped:  {}", self.skipped)?;
        Ok(())
    }
}

/// Execute the `import` command.
pub async fn execute(
    args: ImportArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    Uuid::parse_str(&args.tenant)
        .map_err(|e| CliError::Config(format!("--tenant is not a valid UUID: {e}")))?;
    if !args.file.exists() {
        return Err(CliError::Command(format!(
            "history file not found: {}",
            args.file.display()
        )));
    }

    let config = load_config(config_path).await?;
    let dsn = config.db.postgres_dsn.trim();
    if dsn.is_empty() {
        return Err(CliError::Config(
            "db.postgres_dsn is required for import".to_owned(),
        ));
    }

    info!(tenant = %args.tenant, file = %args.file.display(), "importing history");

    let db = Db::open(dsn).await?;
    db.ensure_schema().await?;
    let outcome = import_history_file(&db, &args.tenant, &args.file).await?;

    writer.render(&ImportReport {
        tenant_id: args.tenant,
        file: args.file.display().to_string(),
        inserted: outcome.inserted,
        skipped: outcome.skipped,
    })?;

    Ok(())
}

pub(crate) async fn load_config(path: &Path) -> Result<HistonConfig, CliError> {
    let config = HistonConfig::load(path)
        .await
        .map_err(|e| CliError::Config(e.to_string()))?;
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(config)
}
