//! Ingest pipeline module initialization.
//!
//! Converts the core configuration into an `IngestPipelineConfig`,
//! wires the downstream sequenced-message channel and the storage
//! seams, and wraps the pipeline in a `ModuleHandle`.
//!
//! # Channel Wiring
//!
//! ```text
//! IngestPipeline --SequencedMessage--> sequenced_tx --> store-writer
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use histon_core::config::HistonConfig;
use histon_core::event::{SequencedMessage, MODULE_INGEST};
use histon_core::storage::{ApiKeyStore, SequenceStore};
use histon_ingest::{IngestPipelineBuilder, IngestPipelineConfig};
use histon_store::Db;

use super::ModuleHandle;

/// Initialize the ingest pipeline module.
///
/// Returns `None` if no ingest listener is enabled in configuration.
pub fn init(
    config: &HistonConfig,
    db: Option<Arc<Db>>,
    sequenced_tx: mpsc::Sender<SequencedMessage>,
) -> Result<Option<ModuleHandle>> {
    if !config.ingest.clear.enabled && !config.ingest.tls.enabled {
        tracing::info!("ingest pipeline disabled in configuration (no listeners)");
        return Ok(None);
    }

    tracing::info!("initializing ingest pipeline");

    let pipeline_config = IngestPipelineConfig::from_core(config)
        .map_err(|e| anyhow::anyhow!("failed to derive ingest config: {}", e))?;

    let mut builder = IngestPipelineBuilder::new()
        .config(pipeline_config)
        .sequenced_sender(sequenced_tx);

    if let Some(db) = db {
        builder = builder
            .sequence_store(db.clone() as Arc<dyn SequenceStore>)
            .api_key_store(db as Arc<dyn ApiKeyStore>);
    }

    let pipeline = builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build ingest pipeline: {}", e))?;

    Ok(Some(ModuleHandle::new(
        MODULE_INGEST,
        true,
        Box::new(pipeline),
    )))
}
