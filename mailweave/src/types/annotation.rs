//! Rows written back by annotation collaborators
//!
//! The store joins these into history and summary results but never
//! computes their content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::message::Message;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedAnnotation {
    pub message_id: String,
    pub summary: Option<String>,
    pub intent: Option<String>,
    pub request_type: Option<String>,
    pub reply: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// A calendar event extracted from a message, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCalendarLink {
    pub message_id: String,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Vec<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarLink {
    pub id: String,
    pub message_id: String,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub attendees: Vec<String>,
    pub link: Option<String>,
}

impl CalendarLink {
    pub fn from_new(id: String, new: &NewCalendarLink) -> Self {
        Self {
            id,
            message_id: new.message_id.clone(),
            title: new.title.clone(),
            start_time: new.start_time,
            end_time: new.end_time,
            attendees: new.attendees.clone(),
            link: new.link.clone(),
        }
    }
}

/// Cleaned text handed to annotation collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRequest {
    pub message_id: String,
    pub thread_id: String,
    pub text: String,
}

impl AnnotationRequest {
    /// Replies carry their thread context in front of the cleaned body.
    pub fn for_message(message: &Message, subject_root: &str) -> Self {
        let mut text = String::new();
        if message.is_reply() {
            text.push_str(&format!("[REPLY to thread: {}] ", subject_root));
            if let Some(parent) = &message.in_reply_to {
                text.push_str(&format!("[In reply to: {}] ", parent));
            }
        }
        text.push_str(&message.body_cleaned);

        Self {
            message_id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            text,
        }
    }
}
