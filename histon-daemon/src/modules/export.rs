//! Export service module initialization.

use std::sync::Arc;

use anyhow::Result;

use histon_core::config::HistonConfig;
use histon_core::event::MODULE_EXPORT;
use histon_core::storage::ApiKeyStore;
use histon_export::{ExportServiceBuilder, ExportServiceConfig};
use histon_store::Db;

use super::ModuleHandle;

/// Initialize the export service module.
///
/// Returns `None` if no export endpoint is enabled in configuration.
pub fn init(config: &HistonConfig, db: Option<Arc<Db>>) -> Result<Option<ModuleHandle>> {
    if !config.export.http.enabled && !config.export.https.enabled {
        tracing::info!("export service disabled in configuration (no endpoints)");
        return Ok(None);
    }

    tracing::info!("initializing export service");

    let service_config = ExportServiceConfig::from_core(config)
        .map_err(|e| anyhow::anyhow!("failed to derive export config: {}", e))?;

    let mut builder = ExportServiceBuilder::new().config(service_config);
    if let Some(db) = db {
        builder = builder.db(db.clone()).api_key_store(db as Arc<dyn ApiKeyStore>);
    }

    let service = builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build export service: {}", e))?;

    Ok(Some(ModuleHandle::new(
        MODULE_EXPORT,
        true,
        Box::new(service),
    )))
}
