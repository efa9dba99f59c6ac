//! Subcommand handlers.

pub mod api_key;
pub mod config;
pub mod export;
pub mod import;
pub mod serve;
