use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{from_millis, json_list, to_millis};
use crate::error::Result;
use crate::types::{LatestMessage, ThreadSummary};

/// Add one message to a thread's aggregate, creating the thread if needed.
///
/// Must run inside the write transaction that inserted the message.
pub fn record_message(
    conn: &Connection,
    thread_id: &str,
    subject_root: &str,
    sender_address: &str,
    received_at: &DateTime<Utc>,
) -> Result<()> {
    let existing: Option<(String, i64)> = conn
        .query_row(
            "SELECT participants, message_count FROM threads WHERE thread_id = ?1",
            params![thread_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match existing {
        None => {
            conn.execute(
                "INSERT INTO threads (thread_id, subject_root, participants, message_count, last_updated)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![
                    thread_id,
                    subject_root,
                    serde_json::to_string(&[sender_address])?,
                    to_millis(received_at),
                ],
            )?;
        }
        Some((participants_json, count)) => {
            let mut participants = json_list(&participants_json);
            if !participants.iter().any(|p| p == sender_address) {
                participants.push(sender_address.to_string());
                participants.sort();
            }
            conn.execute(
                "UPDATE threads
                 SET participants = ?1,
                     message_count = ?2,
                     last_updated = MAX(last_updated, ?3),
                     subject_root = CASE WHEN subject_root = '' THEN ?4 ELSE subject_root END
                 WHERE thread_id = ?5",
                params![
                    serde_json::to_string(&participants)?,
                    count + 1,
                    to_millis(received_at),
                    subject_root,
                    thread_id,
                ],
            )?;
        }
    }
    Ok(())
}

/// Recount a thread and rebuild its sender set from its current messages.
/// `last_updated` only moves forward.
pub fn refresh_aggregate(conn: &Connection, thread_id: &str) -> Result<()> {
    let (count, latest): (i64, Option<i64>) = conn.query_row(
        "SELECT COUNT(*), MAX(received_at) FROM messages WHERE thread_id = ?1",
        params![thread_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT DISTINCT sender_address FROM messages
         WHERE thread_id = ?1
         ORDER BY sender_address",
    )?;
    let rows = stmt.query_map(params![thread_id], |row| row.get::<_, String>(0))?;
    let mut participants = Vec::new();
    for row in rows {
        participants.push(row?);
    }

    conn.execute(
        "UPDATE threads
         SET message_count = ?1,
             participants = ?2,
             last_updated = MAX(last_updated, COALESCE(?3, last_updated))
         WHERE thread_id = ?4",
        params![count, serde_json::to_string(&participants)?, latest, thread_id],
    )?;
    Ok(())
}

/// Aggregate plus date range and latest message. `None` for unknown or
/// emptied threads.
pub fn summary(conn: &Connection, thread_id: &str) -> Result<Option<ThreadSummary>> {
    let row = conn
        .query_row(
            "SELECT t.thread_id, t.subject_root, t.participants, t.message_count, t.last_updated,
                    MIN(m.received_at), MAX(m.received_at)
             FROM threads t
             JOIN messages m ON m.thread_id = t.thread_id
             WHERE t.thread_id = ?1 AND t.message_count > 0
             GROUP BY t.thread_id",
            params![thread_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((thread_id, subject_root, participants, count, last_updated, first, last)) = row
    else {
        return Ok(None);
    };

    let latest = conn
        .query_row(
            "SELECT m.id, m.subject, m.sender, p.summary, p.intent
             FROM messages m
             LEFT JOIN processed_annotations p ON p.message_id = m.id
             WHERE m.thread_id = ?1
             ORDER BY m.received_at DESC, m.rowid DESC
             LIMIT 1",
            params![thread_id],
            |row| {
                Ok(LatestMessage {
                    message_id: row.get(0)?,
                    subject: row.get(1)?,
                    sender: row.get(2)?,
                    summary: row.get(3)?,
                    intent: row.get(4)?,
                })
            },
        )
        .optional()?;

    Ok(Some(ThreadSummary {
        thread_id,
        subject_root,
        participants: json_list(&participants),
        message_count: count.max(0) as u64,
        first_message_at: from_millis(first),
        last_message_at: from_millis(last),
        last_updated: from_millis(last_updated),
        latest,
    }))
}

/// Ids of threads with a message matching `query`, most recent first.
/// Case-insensitive over all of Unicode via `unicode_lower`, which the
/// pool registers on every connection.
pub fn search(conn: &Connection, query: &str) -> Result<Vec<String>> {
    let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
    let mut stmt = conn.prepare(
        r"SELECT t.thread_id
          FROM threads t
          JOIN messages m ON m.thread_id = t.thread_id
          LEFT JOIN processed_annotations p ON p.message_id = m.id
          WHERE t.message_count > 0
            AND (unicode_lower(m.subject) LIKE ?1 ESCAPE '\'
                 OR unicode_lower(m.body_cleaned) LIKE ?1 ESCAPE '\'
                 OR unicode_lower(p.summary) LIKE ?1 ESCAPE '\')
          GROUP BY t.thread_id
          ORDER BY t.last_updated DESC, t.thread_id ASC",
    )?;
    let rows = stmt.query_map(params![pattern], |row| row.get::<_, String>(0))?;
    collect_ids(rows)
}

pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT thread_id FROM threads
         WHERE message_count > 0
         ORDER BY last_updated DESC, thread_id ASC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;
    collect_ids(rows)
}

fn collect_ids(
    rows: impl Iterator<Item = rusqlite::Result<String>>,
) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

/// LIKE treats `%` and `_` as wildcards; match them literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
