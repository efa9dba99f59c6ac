//! `histon api-key` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use histon_store::{create_api_key, Db};

use crate::cli::ApiKeyArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Result payload for the api-key command.
///
/// The full token is shown exactly once; only its hash is stored.
#[derive(Debug, Serialize)]
pub struct ApiKeyReport {
    /// Tenant the key belongs to.
    pub tenant_id: String,
    /// Optional associated user.
    pub user_id: Option<String>,
    /// Public key identifier.
    pub key_id: String,
    /// One-time bearer token (`key_id.secret`).
    pub api_key: String,
}

impl Render for ApiKeyReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "tenant_id: {}", self.tenant_id)?;
        if let Some(user_id) = &self.user_id {
            writeln!(w, "user_id:   {user_id}")?;
        }
        writeln!(w, "key_id:    {}", self.key_id)?;
        writeln!(w, "api_key:   {}", self.api_key)?;
        writeln!(w, "note: api_key is shown only now; store it safely.")?;
        Ok(())
    }
}

/// Execute the `api-key` command.
pub async fn execute(
    args: ApiKeyArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let tenant = Uuid::parse_str(&args.tenant)
        .map_err(|e| CliError::Config(format!("--tenant is not a valid UUID: {e}")))?;
    let user = args
        .user
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|e| CliError::Config(format!("--user is not a valid UUID: {e}")))?;

    let config = super::import::load_config(config_path).await?;
    let dsn = config.db.postgres_dsn.trim();
    if dsn.is_empty() {
        return Err(CliError::Config(
            "db.postgres_dsn is required to create api keys".to_owned(),
        ));
    }
    let pepper = config.globals.pepper.trim();
    if pepper.is_empty() {
        return Err(CliError::Config(
            "globals.pepper is required to create api keys".to_owned(),
        ));
    }

    let db = Db::open(dsn).await?;
    db.ensure_schema().await?;
    let created = create_api_key(&db, tenant, user, pepper).await?;

    writer.render(&ApiKeyReport {
        tenant_id: created.tenant_id.to_string(),
        user_id: created.user_id.map(|u| u.to_string()),
        key_id: created.key_id,
        api_key: created.token,
    })?;

    Ok(())
}
