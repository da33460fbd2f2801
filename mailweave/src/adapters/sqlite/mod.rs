//! SQLite thread store
//!
//! Writes run in `BEGIN IMMEDIATE` transactions, so the read-modify-write of
//! a thread aggregate holds the database write lock from its first read.
//! Concurrent writers queue on the busy timeout instead of racing.

pub mod annotations;
pub mod messages;
pub mod pool;
pub mod schema;
pub mod threads;

use chrono::{DateTime, Utc};
use rusqlite::{Transaction, TransactionBehavior};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

pub use pool::DbPool;

use crate::config::StoreConfig;
use crate::error::{MailweaveError, Result};
use crate::store::ThreadStore;
use crate::types::{
    AnnotationRequest, HistoryEntry, Message, NewCalendarLink, NewMessage, ProcessedAnnotation,
    ThreadHistory, ThreadInfo, ThreadSummary,
};
use pool::DbConnection;

pub(crate) fn to_millis(at: &DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub(crate) fn json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub struct SqliteThreadStore {
    pool: DbPool,
}

impl SqliteThreadStore {
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        let pool = pool::create_pool(
            path,
            config.pool_size,
            Duration::from_millis(config.busy_timeout_ms),
        )?;
        Self::from_pool(pool)
    }

    /// Private in-memory database, mainly for tests.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(pool::in_memory_pool()?)
    }

    fn from_pool(pool: DbPool) -> Result<Self> {
        let conn = pool.get()?;
        schema::initialize_schema(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    fn connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Run `f` in an immediate write transaction, committing on success.
    fn write<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn summaries(&self, conn: &rusqlite::Connection, ids: Vec<String>) -> Result<Vec<ThreadSummary>> {
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(summary) = threads::summary(conn, &id)? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }
}

impl ThreadStore for SqliteThreadStore {
    fn insert(&self, message: &NewMessage, info: &ThreadInfo) -> Result<String> {
        let started = Instant::now();
        let stored = Message::assemble(Uuid::new_v4().to_string(), message, info);

        self.write(|tx| {
            messages::insert_message(tx, &stored)?;
            threads::record_message(
                tx,
                &stored.thread_id,
                &info.subject_root,
                &stored.sender_address(),
                &stored.received_at,
            )
        })?;

        debug!(
            message_id = %stored.id,
            thread_id = %stored.thread_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stored message"
        );
        Ok(stored.id)
    }

    fn link_reply(&self, reply_id: &str, original_id: &str) -> Result<()> {
        if reply_id == original_id {
            return Err(MailweaveError::InvalidInput(format!(
                "Cannot link message {} to itself",
                reply_id
            )));
        }

        let (from_thread, to_thread) = self.write(|tx| {
            let reply = messages::get_message(tx, reply_id)?
                .ok_or_else(|| MailweaveError::MessageNotFound(reply_id.to_string()))?;
            let original = messages::get_message(tx, original_id)?
                .ok_or_else(|| MailweaveError::MessageNotFound(original_id.to_string()))?;

            let mut chain = original.reference_chain.clone();
            chain.push(original.message_identity.clone());
            messages::set_reply_link(
                tx,
                reply_id,
                &original.thread_id,
                &original.message_identity,
                &chain,
            )?;

            if reply.thread_id != original.thread_id {
                threads::refresh_aggregate(tx, &reply.thread_id)?;
                threads::refresh_aggregate(tx, &original.thread_id)?;
            }
            Ok((reply.thread_id, original.thread_id))
        })?;

        info!(
            reply_id,
            original_id, from_thread = %from_thread, to_thread = %to_thread, "Linked reply"
        );
        Ok(())
    }

    fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let conn = self.connection()?;
        messages::get_message(&conn, id)
    }

    fn get_thread_history(&self, thread_id: &str) -> Result<ThreadHistory> {
        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;

        let summary = threads::summary(&tx, thread_id)?
            .ok_or_else(|| MailweaveError::ThreadNotFound(thread_id.to_string()))?;

        let mut entries = Vec::with_capacity(summary.message_count as usize);
        for message in messages::thread_messages(&tx, thread_id)? {
            let annotation = annotations::get_annotation(&tx, &message.id)?;
            let calendar_links = annotations::calendar_links(&tx, &message.id)?;
            entries.push(HistoryEntry {
                message,
                annotation,
                calendar_links,
            });
        }
        tx.commit()?;

        Ok(ThreadHistory {
            summary,
            messages: entries,
        })
    }

    fn get_thread_participants(&self, thread_id: &str) -> Result<Vec<String>> {
        let conn = self.connection()?;
        messages::thread_senders(&conn, thread_id)
    }

    fn get_thread_summary(&self, thread_id: &str) -> Result<Option<ThreadSummary>> {
        let conn = self.connection()?;
        threads::summary(&conn, thread_id)
    }

    fn search_threads(&self, query: &str) -> Result<Vec<ThreadSummary>> {
        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;
        let ids = threads::search(&tx, query)?;
        let summaries = self.summaries(&tx, ids)?;
        tx.commit()?;
        debug!(query, hits = summaries.len(), "Searched threads");
        Ok(summaries)
    }

    fn get_recent_threads(&self, limit: usize) -> Result<Vec<ThreadSummary>> {
        let conn = self.connection()?;
        let tx = conn.unchecked_transaction()?;
        let ids = threads::recent(&tx, limit)?;
        let summaries = self.summaries(&tx, ids)?;
        tx.commit()?;
        Ok(summaries)
    }

    fn save_annotation(&self, annotation: &ProcessedAnnotation) -> Result<()> {
        self.write(|tx| {
            if !messages::message_exists(tx, &annotation.message_id)? {
                return Err(MailweaveError::MessageNotFound(annotation.message_id.clone()));
            }
            annotations::upsert_annotation(tx, annotation)
        })
    }

    fn save_calendar_link(&self, link: &NewCalendarLink) -> Result<String> {
        self.write(|tx| {
            if !messages::message_exists(tx, &link.message_id)? {
                return Err(MailweaveError::MessageNotFound(link.message_id.clone()));
            }
            annotations::insert_calendar_link(tx, link)
        })
    }

    fn get_unannotated(&self, limit: usize) -> Result<Vec<AnnotationRequest>> {
        let conn = self.connection()?;
        messages::unannotated(&conn, limit)
    }
}
