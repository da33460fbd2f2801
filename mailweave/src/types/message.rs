use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::address::normalize_address;
use crate::types::thread::ThreadInfo;

/// A message ready to be stored, before the store assigns its id.
///
/// Threading fields come from the [`ThreadInfo`](crate::types::ThreadInfo)
/// passed alongside it on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body_raw: String,
    pub body_cleaned: String,
    pub received_at: DateTime<Utc>,
}

impl NewMessage {
    /// Deduplication key for the thread's sender set.
    pub fn sender_address(&self) -> String {
        normalize_address(&self.sender)
    }
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body_raw: String,
    pub body_cleaned: String,
    pub message_identity: String,
    pub in_reply_to: Option<String>,
    pub reference_chain: Vec<String>,
    pub thread_id: String,
    /// Sender, recipient and cc addresses resolved for this message, sorted.
    pub participants: Vec<String>,
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Build the stored form of `new` as resolved by `info`.
    pub fn assemble(id: String, new: &NewMessage, info: &ThreadInfo) -> Self {
        Self {
            id,
            sender: new.sender.clone(),
            recipients: new.recipients.clone(),
            cc: new.cc.clone(),
            subject: new.subject.clone(),
            body_raw: new.body_raw.clone(),
            body_cleaned: new.body_cleaned.clone(),
            message_identity: info.message_identity.clone(),
            in_reply_to: info.in_reply_to.clone(),
            reference_chain: info.reference_chain.clone(),
            thread_id: info.storage_thread_id().to_string(),
            participants: info.participants.iter().cloned().collect(),
            received_at: new.received_at,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.in_reply_to.is_some() || !self.reference_chain.is_empty()
    }

    pub fn sender_address(&self) -> String {
        normalize_address(&self.sender)
    }
}
