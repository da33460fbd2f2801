use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::annotation::{CalendarLink, ProcessedAnnotation};
use crate::types::message::Message;

/// Threading metadata resolved for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub message_identity: String,
    /// `None` only when resolution degraded; the store then files the
    /// message under its own identity.
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    /// Ancestor identities, outermost first.
    pub reference_chain: Vec<String>,
    pub is_reply: bool,
    pub subject_root: String,
    pub participants: BTreeSet<String>,
}

impl ThreadInfo {
    /// Unlinked info used when the identity headers cannot be trusted.
    pub fn degraded(message_identity: String, raw_subject: &str) -> Self {
        Self {
            message_identity,
            thread_id: None,
            in_reply_to: None,
            reference_chain: Vec::new(),
            is_reply: false,
            subject_root: raw_subject.to_string(),
            participants: BTreeSet::new(),
        }
    }

    /// Thread id the message is stored under.
    pub fn storage_thread_id(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(&self.message_identity)
    }
}

/// The most recent message of a thread, with its annotation if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestMessage {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub summary: Option<String>,
    pub intent: Option<String>,
}

/// Aggregate view of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub subject_root: String,
    /// Distinct normalized senders, sorted.
    pub participants: Vec<String>,
    pub message_count: u64,
    pub first_message_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub latest: Option<LatestMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub message: Message,
    pub annotation: Option<ProcessedAnnotation>,
    pub calendar_links: Vec<CalendarLink>,
}

/// A thread's summary plus its messages in ascending `received_at` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHistory {
    pub summary: ThreadSummary,
    pub messages: Vec<HistoryEntry>,
}
