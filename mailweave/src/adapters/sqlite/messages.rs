use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{from_millis, json_list, to_millis};
use crate::error::Result;
use crate::types::{AnnotationRequest, Message};

const MESSAGE_COLUMNS: &str = "m.id, m.sender, m.recipients, m.cc, m.subject, m.body_raw, \
     m.body_cleaned, m.message_identity, m.in_reply_to, m.reference_chain, m.thread_id, \
     m.participants, m.received_at";

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipients: json_list(&row.get::<_, String>(2)?),
        cc: json_list(&row.get::<_, String>(3)?),
        subject: row.get(4)?,
        body_raw: row.get(5)?,
        body_cleaned: row.get(6)?,
        message_identity: row.get(7)?,
        in_reply_to: row.get(8)?,
        reference_chain: json_list(&row.get::<_, String>(9)?),
        thread_id: row.get(10)?,
        participants: json_list(&row.get::<_, String>(11)?),
        received_at: from_millis(row.get(12)?),
    })
}

pub fn insert_message(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (
            id, thread_id, message_identity, sender, sender_address, recipients, cc,
            subject, body_raw, body_cleaned, in_reply_to, reference_chain, participants,
            received_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            message.id,
            message.thread_id,
            message.message_identity,
            message.sender,
            message.sender_address(),
            serde_json::to_string(&message.recipients)?,
            serde_json::to_string(&message.cc)?,
            message.subject,
            message.body_raw,
            message.body_cleaned,
            message.in_reply_to,
            serde_json::to_string(&message.reference_chain)?,
            serde_json::to_string(&message.participants)?,
            to_millis(&message.received_at),
        ],
    )?;
    Ok(())
}

pub fn get_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let sql = format!("SELECT {} FROM messages m WHERE m.id = ?1", MESSAGE_COLUMNS);
    let message = conn
        .query_row(&sql, params![id], message_from_row)
        .optional()?;
    Ok(message)
}

pub fn message_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

/// Messages of a thread, oldest first; ties keep insertion order.
pub fn thread_messages(conn: &Connection, thread_id: &str) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {} FROM messages m
         WHERE m.thread_id = ?1
         ORDER BY m.received_at ASC, m.rowid ASC",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![thread_id], message_from_row)?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

/// Rewrite the reply linkage of one message.
pub fn set_reply_link(
    conn: &Connection,
    id: &str,
    thread_id: &str,
    in_reply_to: &str,
    reference_chain: &[String],
) -> Result<()> {
    conn.execute(
        "UPDATE messages
         SET thread_id = ?1, in_reply_to = ?2, reference_chain = ?3
         WHERE id = ?4",
        params![
            thread_id,
            in_reply_to,
            serde_json::to_string(reference_chain)?,
            id
        ],
    )?;
    Ok(())
}

/// Distinct sender addresses of a thread in order of first appearance.
pub fn thread_senders(conn: &Connection, thread_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT sender_address FROM messages
         WHERE thread_id = ?1
         GROUP BY sender_address
         ORDER BY MIN(received_at) ASC, MIN(rowid) ASC",
    )?;
    let rows = stmt.query_map(params![thread_id], |row| row.get::<_, String>(0))?;

    let mut senders = Vec::new();
    for row in rows {
        senders.push(row?);
    }
    Ok(senders)
}

/// Oldest messages without an annotation, with their thread's subject root.
pub fn unannotated(conn: &Connection, limit: usize) -> Result<Vec<AnnotationRequest>> {
    let sql = format!(
        "SELECT {}, t.subject_root FROM messages m
         JOIN threads t ON t.thread_id = m.thread_id
         LEFT JOIN processed_annotations p ON p.message_id = m.id
         WHERE p.message_id IS NULL
         ORDER BY m.received_at ASC, m.rowid ASC
         LIMIT ?1",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        let message = message_from_row(row)?;
        let subject_root: String = row.get(13)?;
        Ok(AnnotationRequest::for_message(&message, &subject_root))
    })?;

    let mut requests = Vec::new();
    for row in rows {
        requests.push(row?);
    }
    Ok(requests)
}
