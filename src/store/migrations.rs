use rusqlite::Connection;
use tracing::info;

use crate::common::error::StoreResult;

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS authors (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            discord_id          TEXT UNIQUE,
            whatsapp_id         TEXT UNIQUE,
            display_name        TEXT NOT NULL,
            permission_level    INTEGER NOT NULL DEFAULT 0,
            flags               INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channels (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            discord_id          TEXT NOT NULL UNIQUE,
            whatsapp_id         TEXT NOT NULL,
            discord_webhook_url TEXT NOT NULL,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_channels_whatsapp
            ON channels(whatsapp_id);

        CREATE TABLE IF NOT EXISTS messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            author_id           INTEGER NOT NULL REFERENCES authors(id),
            channel_id          INTEGER NOT NULL REFERENCES channels(id),
            reply_to_id         INTEGER REFERENCES messages(id),
            original_platform   TEXT NOT NULL,
            attachment_kind     TEXT,
            attachment_size     INTEGER,
            content             TEXT NOT NULL,
            original_deleted    INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS platform_messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id          INTEGER NOT NULL REFERENCES messages(id),
            platform            TEXT NOT NULL,
            native_id           TEXT NOT NULL,
            kind                TEXT NOT NULL,
            deleted             INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_platform_messages_native
            ON platform_messages(native_id);

        CREATE INDEX IF NOT EXISTS idx_platform_messages_message
            ON platform_messages(message_id, platform, kind);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
