//! The thread store capability
//!
//! One interface, two interchangeable backends selected by configuration.
//! Every write that touches a thread aggregate is serialized per thread, so
//! concurrent inserts never lose a participant or undercount a thread.

use std::sync::Arc;
use tracing::info;

use crate::adapters::memory::MemoryThreadStore;
use crate::adapters::sqlite::SqliteThreadStore;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;
use crate::types::{
    AnnotationRequest, Message, NewCalendarLink, NewMessage, ProcessedAnnotation, ThreadHistory,
    ThreadInfo, ThreadSummary,
};

pub trait ThreadStore: Send + Sync {
    /// Persist `message` and update its thread aggregate, all or nothing.
    /// Returns the assigned message id.
    fn insert(&self, message: &NewMessage, info: &ThreadInfo) -> Result<String>;

    /// Move `reply_id` onto the thread of `original_id`, rewriting its
    /// reply headers to point at the original.
    fn link_reply(&self, reply_id: &str, original_id: &str) -> Result<()>;

    fn get_message(&self, id: &str) -> Result<Option<Message>>;

    /// Summary plus every message in ascending `received_at` order, each
    /// joined with its annotation and calendar links.
    fn get_thread_history(&self, thread_id: &str) -> Result<ThreadHistory>;

    /// Distinct normalized senders in order of first appearance.
    fn get_thread_participants(&self, thread_id: &str) -> Result<Vec<String>>;

    /// `None` when the thread has no messages.
    fn get_thread_summary(&self, thread_id: &str) -> Result<Option<ThreadSummary>>;

    /// Threads whose subject, cleaned body or annotation summary contains
    /// `query` (case-insensitive), most recently active first.
    fn search_threads(&self, query: &str) -> Result<Vec<ThreadSummary>>;

    fn get_recent_threads(&self, limit: usize) -> Result<Vec<ThreadSummary>>;

    /// Insert or replace the annotation for a message.
    fn save_annotation(&self, annotation: &ProcessedAnnotation) -> Result<()>;

    fn save_calendar_link(&self, link: &NewCalendarLink) -> Result<String>;

    /// Oldest messages that have no annotation yet.
    fn get_unannotated(&self, limit: usize) -> Result<Vec<AnnotationRequest>>;
}

/// Open the backend named by `config`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn ThreadStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory thread store");
            Ok(Arc::new(MemoryThreadStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = config.database_path()?;
            info!("Opening SQLite thread store at {:?}", path);
            Ok(Arc::new(SqliteThreadStore::open(&path, config)?))
        }
    }
}
