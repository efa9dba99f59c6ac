#![doc = include_str!("../README.md")]

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod keys;
pub mod writer;

// --- 주요 타입 re-export ---

pub use config::StoreConfig;
pub use db::Db;
pub use error::StoreError;
pub use import::{import_history_file, ImportOutcome};
pub use keys::{create_api_key, CreatedKey};
pub use writer::{StoreWriter, StoreWriterBuilder};
