//! Store writer module initialization.
//!
//! The store writer always registers: it owns the receiving side of the
//! sequenced-message channel. Without a database it runs in drain mode
//! (the spool stays the durable copy).

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use histon_core::config::HistonConfig;
use histon_core::event::{SequencedMessage, MODULE_STORE};
use histon_store::{Db, StoreWriterBuilder};

use super::ModuleHandle;

/// Initialize the store writer module.
pub fn init(
    config: &HistonConfig,
    db: Option<Arc<Db>>,
    sequenced_rx: mpsc::Receiver<SequencedMessage>,
) -> Result<ModuleHandle> {
    tracing::info!(workers = config.ingest.db_workers, "initializing store writer");

    let mut builder = StoreWriterBuilder::new()
        .workers(config.ingest.db_workers)
        .sequenced_receiver(sequenced_rx);

    if let Some(db) = db {
        builder = builder.db(db);
    }

    let writer = builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build store writer: {}", e))?;

    Ok(ModuleHandle::new(MODULE_STORE, true, Box::new(writer)))
}
