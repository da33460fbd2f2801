//! Mailweave - email ingestion and threading core
//!
//! Turns raw messages into cleaned text and threaded conversations.
//!
//! ## Module Organization
//!
//! - `adapters/`: MIME decoding and the two thread store backends
//! - `services/`: Thread resolution and the ingest pipeline
//! - `store`: The `ThreadStore` capability and backend selection
//! - `types/`: Messages, threads and annotation rows
//! - `config/`: TOML configuration
//!
//! Content cleaning lives in the `email_cleaner` crate.

pub mod adapters;
pub mod config;
pub mod error;
pub mod services;
pub mod store;
pub mod types;

use tracing_subscriber::EnvFilter;

pub use config::AppConfig;
pub use error::{MailweaveError, Result};
pub use services::{BatchReport, IngestOutcome, Ingested, Ingestor, ThreadResolver};
pub use store::{open_store, ThreadStore};

/// Install the global fmt subscriber. `RUST_LOG` overrides the default
/// filter. Calling this again after a subscriber is set does nothing.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("mailweave=debug,email_cleaner=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
