use rusqlite::Connection;

use crate::error::Result;

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        -- Ingested messages; thread assignment is written once at insert
        -- and only changed by link_reply
        CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,   -- UUID
            thread_id        TEXT NOT NULL,
            message_identity TEXT NOT NULL,      -- Message-ID without brackets, or synthetic-<hash>
            sender           TEXT NOT NULL,
            sender_address   TEXT NOT NULL,      -- normalized, dedup key for thread senders
            recipients       TEXT NOT NULL DEFAULT '[]',  -- JSON array
            cc               TEXT NOT NULL DEFAULT '[]',  -- JSON array
            subject          TEXT NOT NULL DEFAULT '',
            body_raw         TEXT NOT NULL DEFAULT '',
            body_cleaned     TEXT NOT NULL DEFAULT '',
            in_reply_to      TEXT,
            reference_chain  TEXT NOT NULL DEFAULT '[]',  -- JSON array, outermost first
            participants     TEXT NOT NULL DEFAULT '[]',  -- JSON array, sorted
            received_at      INTEGER NOT NULL    -- unix epoch ms
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages(thread_id, received_at);
        CREATE INDEX IF NOT EXISTS idx_messages_received
            ON messages(received_at);

        -- Per-thread aggregates, maintained incrementally
        CREATE TABLE IF NOT EXISTS threads (
            thread_id        TEXT PRIMARY KEY,
            subject_root     TEXT NOT NULL DEFAULT '',
            participants     TEXT NOT NULL DEFAULT '[]',  -- JSON array of sender addresses, sorted
            message_count    INTEGER NOT NULL DEFAULT 0,
            last_updated     INTEGER NOT NULL    -- unix epoch ms, never decreases
        );

        CREATE INDEX IF NOT EXISTS idx_threads_last_updated
            ON threads(last_updated DESC);

        -- Written back by annotation services
        CREATE TABLE IF NOT EXISTS processed_annotations (
            message_id       TEXT PRIMARY KEY REFERENCES messages(id),
            summary          TEXT,
            intent           TEXT,
            request_type     TEXT,
            reply            TEXT,
            processed_at     INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS calendar_links (
            id               TEXT PRIMARY KEY,   -- UUID
            message_id       TEXT NOT NULL REFERENCES messages(id),
            title            TEXT NOT NULL DEFAULT '',
            start_time       INTEGER,
            end_time         INTEGER,
            attendees        TEXT NOT NULL DEFAULT '[]',  -- JSON array
            link             TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_calendar_links_message
            ON calendar_links(message_id);
    ")?;

    Ok(())
}
