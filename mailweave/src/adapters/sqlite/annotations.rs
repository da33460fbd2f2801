use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{from_millis, json_list, to_millis};
use crate::error::Result;
use crate::types::{CalendarLink, NewCalendarLink, ProcessedAnnotation};

pub fn upsert_annotation(conn: &Connection, annotation: &ProcessedAnnotation) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO processed_annotations (
            message_id, summary, intent, request_type, reply, processed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            annotation.message_id,
            annotation.summary,
            annotation.intent,
            annotation.request_type,
            annotation.reply,
            to_millis(&annotation.processed_at),
        ],
    )?;
    Ok(())
}

pub fn get_annotation(conn: &Connection, message_id: &str) -> Result<Option<ProcessedAnnotation>> {
    let annotation = conn
        .query_row(
            "SELECT message_id, summary, intent, request_type, reply, processed_at
             FROM processed_annotations WHERE message_id = ?1",
            params![message_id],
            |row| {
                Ok(ProcessedAnnotation {
                    message_id: row.get(0)?,
                    summary: row.get(1)?,
                    intent: row.get(2)?,
                    request_type: row.get(3)?,
                    reply: row.get(4)?,
                    processed_at: from_millis(row.get(5)?),
                })
            },
        )
        .optional()?;
    Ok(annotation)
}

pub fn insert_calendar_link(conn: &Connection, link: &NewCalendarLink) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO calendar_links (
            id, message_id, title, start_time, end_time, attendees, link
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            link.message_id,
            link.title,
            link.start_time.as_ref().map(to_millis),
            link.end_time.as_ref().map(to_millis),
            serde_json::to_string(&link.attendees)?,
            link.link,
        ],
    )?;
    Ok(id)
}

/// Calendar links of a message in the order they were saved.
pub fn calendar_links(conn: &Connection, message_id: &str) -> Result<Vec<CalendarLink>> {
    let mut stmt = conn.prepare(
        "SELECT id, message_id, title, start_time, end_time, attendees, link
         FROM calendar_links
         WHERE message_id = ?1
         ORDER BY rowid ASC",
    )?;
    let rows = stmt.query_map(params![message_id], |row| {
        Ok(CalendarLink {
            id: row.get(0)?,
            message_id: row.get(1)?,
            title: row.get(2)?,
            start_time: row.get::<_, Option<i64>>(3)?.map(from_millis),
            end_time: row.get::<_, Option<i64>>(4)?.map(from_millis),
            attendees: json_list(&row.get::<_, String>(5)?),
            link: row.get(6)?,
        })
    })?;

    let mut links = Vec::new();
    for row in rows {
        links.push(row?);
    }
    Ok(links)
}
