use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{
    Author, AuthorDefaults, AuthorKey, BridgeStats, Channel, Message, NewChannel, NewMessage,
    NewPlatformMessage, PlatformMessage,
};
use super::Database;
use crate::common::error::{StoreError, StoreResult};
use crate::common::types::{Platform, PlatformMessageType};

const AUTHOR_COLUMNS: &str = "id, discord_id, whatsapp_id, display_name, permission_level, flags";
const CHANNEL_COLUMNS: &str = "id, discord_id, whatsapp_id, discord_webhook_url";
const MESSAGE_COLUMNS: &str = "id, author_id, channel_id, reply_to_id, original_platform, \
     attachment_kind, attachment_size, content, original_deleted";
const PLATFORM_MESSAGE_COLUMNS: &str = "id, message_id, platform, native_id, kind, deleted";

fn platform_column(platform: Platform) -> &'static str {
    match platform {
        Platform::Discord => "discord_id",
        Platform::WhatsApp => "whatsapp_id",
    }
}

impl Database {
    // -- Channels --

    /// Find the pairing whose room on `platform` is `native_id`.
    pub fn find_channel_by_native_id(
        &self,
        platform: Platform,
        native_id: &str,
    ) -> StoreResult<Option<Channel>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM channels WHERE {} = ?1 ORDER BY id LIMIT 1",
                CHANNEL_COLUMNS,
                platform_column(platform)
            );
            Ok(conn.query_row(&sql, [native_id], channel_from_row).optional()?)
        })
    }

    /// Insert or refresh a pairing keyed by its Discord channel id.
    pub fn upsert_channel(&self, channel: &NewChannel) -> StoreResult<Channel> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (discord_id, whatsapp_id, discord_webhook_url)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(discord_id) DO UPDATE SET
                     whatsapp_id = excluded.whatsapp_id,
                     discord_webhook_url = excluded.discord_webhook_url",
                params![
                    channel.discord_id,
                    channel.whatsapp_id,
                    channel.discord_webhook_url
                ],
            )?;
            let sql = format!("SELECT {} FROM channels WHERE discord_id = ?1", CHANNEL_COLUMNS);
            Ok(conn.query_row(&sql, [&channel.discord_id], channel_from_row)?)
        })
    }

    // -- Authors --

    /// Return the author holding `key`, creating it from `defaults` if
    /// none exists. Lookup and insert happen under one lock.
    pub fn find_or_create_author(
        &self,
        key: &AuthorKey,
        defaults: &AuthorDefaults,
    ) -> StoreResult<Author> {
        self.with_conn(|conn| {
            if let Some(author) = query_author_by_native_id(conn, key.platform, &key.native_id)? {
                return Ok(author);
            }

            let sql = format!(
                "INSERT INTO authors ({}, display_name, flags) VALUES (?1, ?2, ?3)",
                platform_column(key.platform)
            );
            conn.execute(&sql, params![key.native_id, defaults.display_name, defaults.flags])?;
            let id = conn.last_insert_rowid();
            query_author(conn, id)?.ok_or(StoreError::NotFound {
                entity: "author",
                id,
            })
        })
    }

    pub fn find_author(&self, id: i64) -> StoreResult<Option<Author>> {
        self.with_conn(|conn| query_author(conn, id))
    }

    pub fn find_author_by_native_id(
        &self,
        platform: Platform,
        native_id: &str,
    ) -> StoreResult<Option<Author>> {
        self.with_conn(|conn| query_author_by_native_id(conn, platform, native_id))
    }

    // -- Messages --

    pub fn create_message(&self, message: &NewMessage) -> StoreResult<Message> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                     (author_id, channel_id, original_platform, attachment_kind, attachment_size, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.author_id,
                    message.channel_id,
                    message.original_platform,
                    message.attachment_kind,
                    message.attachment_size.map(|size| size as i64),
                    message.content,
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?.ok_or(StoreError::NotFound {
                entity: "message",
                id,
            })
        })
    }

    pub fn find_message(&self, id: i64) -> StoreResult<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Back-fill the reply link of an already created message.
    pub fn update_message_reply_to(&self, id: i64, reply_to_id: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET reply_to_id = ?1 WHERE id = ?2",
                params![reply_to_id, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    entity: "message",
                    id,
                });
            }
            Ok(())
        })
    }

    // -- Platform messages --

    pub fn create_platform_message(
        &self,
        record: &NewPlatformMessage,
    ) -> StoreResult<PlatformMessage> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO platform_messages (message_id, platform, native_id, kind)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record.message_id, record.platform, record.native_id, record.kind],
            )?;
            Ok(PlatformMessage {
                id: conn.last_insert_rowid(),
                message_id: record.message_id,
                platform: record.platform,
                native_id: record.native_id.clone(),
                kind: record.kind,
                deleted: false,
            })
        })
    }

    /// The first artifact recorded on `platform` with this native id.
    pub fn find_platform_message_by_native_id(
        &self,
        platform: Platform,
        native_id: &str,
    ) -> StoreResult<Option<PlatformMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM platform_messages
                 WHERE platform = ?1 AND native_id = ?2
                 ORDER BY id LIMIT 1",
                PLATFORM_MESSAGE_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![platform, native_id], platform_message_from_row)
                .optional()?)
        })
    }

    /// The first artifact of a logical message on `platform` whose type is
    /// one of `kinds`.
    pub fn find_platform_message(
        &self,
        message_id: i64,
        platform: Platform,
        kinds: &[PlatformMessageType],
    ) -> StoreResult<Option<PlatformMessage>> {
        if kinds.is_empty() {
            return Ok(None);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (0..kinds.len()).map(|i| format!("?{}", i + 3)).collect();
            let sql = format!(
                "SELECT {} FROM platform_messages
                 WHERE message_id = ?1 AND platform = ?2 AND kind IN ({})
                 ORDER BY id LIMIT 1",
                PLATFORM_MESSAGE_COLUMNS,
                placeholders.join(", ")
            );

            let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(kinds.len() + 2);
            values.push(&message_id);
            values.push(&platform);
            values.extend(kinds.iter().map(|kind| kind as &dyn rusqlite::types::ToSql));

            Ok(conn
                .query_row(&sql, values.as_slice(), platform_message_from_row)
                .optional()?)
        })
    }

    /// Every artifact of a logical message in the order they were recorded.
    pub fn platform_messages_for(&self, message_id: i64) -> StoreResult<Vec<PlatformMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM platform_messages WHERE message_id = ?1 ORDER BY id",
                PLATFORM_MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([message_id], platform_message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Aggregates --

    pub fn count_messages_by_platform(&self, platform: Platform) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE original_platform = ?1",
                [platform],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    pub fn sum_attachment_sizes(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let sum: i64 = conn.query_row(
                "SELECT COALESCE(SUM(attachment_size), 0) FROM messages",
                [],
                |row| row.get(0),
            )?;
            Ok(sum as u64)
        })
    }

    pub fn stats(&self) -> StoreResult<BridgeStats> {
        Ok(BridgeStats {
            discord_messages: self.count_messages_by_platform(Platform::Discord)?,
            whatsapp_messages: self.count_messages_by_platform(Platform::WhatsApp)?,
            total_attachment_bytes: self.sum_attachment_sizes()?,
        })
    }
}

fn query_author(conn: &Connection, id: i64) -> StoreResult<Option<Author>> {
    let sql = format!("SELECT {} FROM authors WHERE id = ?1", AUTHOR_COLUMNS);
    Ok(conn.query_row(&sql, [id], author_from_row).optional()?)
}

fn query_author_by_native_id(
    conn: &Connection,
    platform: Platform,
    native_id: &str,
) -> StoreResult<Option<Author>> {
    let sql = format!(
        "SELECT {} FROM authors WHERE {} = ?1",
        AUTHOR_COLUMNS,
        platform_column(platform)
    );
    Ok(conn.query_row(&sql, [native_id], author_from_row).optional()?)
}

fn query_message(conn: &Connection, id: i64) -> StoreResult<Option<Message>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    Ok(conn.query_row(&sql, [id], message_from_row).optional()?)
}

fn author_from_row(row: &Row<'_>) -> rusqlite::Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        discord_id: row.get(1)?,
        whatsapp_id: row.get(2)?,
        display_name: row.get(3)?,
        permission_level: row.get(4)?,
        flags: row.get(5)?,
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        discord_id: row.get(1)?,
        whatsapp_id: row.get(2)?,
        discord_webhook_url: row.get(3)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let attachment_size: Option<i64> = row.get(6)?;
    Ok(Message {
        id: row.get(0)?,
        author_id: row.get(1)?,
        channel_id: row.get(2)?,
        reply_to_id: row.get(3)?,
        original_platform: row.get(4)?,
        attachment_kind: row.get(5)?,
        attachment_size: attachment_size.map(|size| size as u64),
        content: row.get(7)?,
        original_deleted: row.get(8)?,
    })
}

fn platform_message_from_row(row: &Row<'_>) -> rusqlite::Result<PlatformMessage> {
    Ok(PlatformMessage {
        id: row.get(0)?,
        message_id: row.get(1)?,
        platform: row.get(2)?,
        native_id: row.get(3)?,
        kind: row.get(4)?,
        deleted: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{author_flags, AttachmentKind};

    fn seeded() -> (Database, Channel) {
        let db = Database::open_in_memory().unwrap();
        let channel = db
            .upsert_channel(&NewChannel {
                discord_id: "100".to_string(),
                whatsapp_id: "120363@g.us".to_string(),
                discord_webhook_url: "https://discord.com/api/webhooks/1/abc".to_string(),
            })
            .unwrap();
        (db, channel)
    }

    fn defaults(name: &str) -> AuthorDefaults {
        AuthorDefaults {
            display_name: name.to_string(),
            flags: 0,
        }
    }

    fn new_message(author_id: i64, channel_id: i64, platform: Platform) -> NewMessage {
        NewMessage {
            author_id,
            channel_id,
            original_platform: platform,
            attachment_kind: None,
            attachment_size: None,
            content: "hello".to_string(),
        }
    }

    #[test]
    fn test_channel_lookup_both_sides() {
        let (db, channel) = seeded();

        let by_discord = db.find_channel_by_native_id(Platform::Discord, "100").unwrap();
        let by_whatsapp = db
            .find_channel_by_native_id(Platform::WhatsApp, "120363@g.us")
            .unwrap();
        assert_eq!(by_discord.as_ref(), Some(&channel));
        assert_eq!(by_whatsapp.as_ref(), Some(&channel));
        assert!(db.find_channel_by_native_id(Platform::Discord, "999").unwrap().is_none());
    }

    #[test]
    fn test_upsert_channel_updates_in_place() {
        let (db, channel) = seeded();
        let updated = db
            .upsert_channel(&NewChannel {
                discord_id: "100".to_string(),
                whatsapp_id: "other@g.us".to_string(),
                discord_webhook_url: "https://discord.com/api/webhooks/2/def".to_string(),
            })
            .unwrap();

        assert_eq!(updated.id, channel.id);
        assert_eq!(updated.whatsapp_id, "other@g.us");
    }

    #[test]
    fn test_find_or_create_author_is_idempotent() {
        let (db, _) = seeded();
        let key = AuthorKey::new(Platform::Discord, "42");

        let first = db.find_or_create_author(&key, &defaults("Ann")).unwrap();
        let second = db.find_or_create_author(&key, &defaults("Renamed")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "Ann");
        assert_eq!(second.discord_id.as_deref(), Some("42"));
        assert_eq!(second.whatsapp_id, None);
    }

    #[test]
    fn test_same_native_id_on_both_platforms_is_two_authors() {
        let (db, _) = seeded();
        let discord = db
            .find_or_create_author(&AuthorKey::new(Platform::Discord, "42"), &defaults("A"))
            .unwrap();
        let whatsapp = db
            .find_or_create_author(&AuthorKey::new(Platform::WhatsApp, "42"), &defaults("B"))
            .unwrap();
        assert_ne!(discord.id, whatsapp.id);
    }

    #[test]
    fn test_author_flags_persist() {
        let (db, _) = seeded();
        let author = db
            .find_or_create_author(
                &AuthorKey::new(Platform::Discord, "7"),
                &AuthorDefaults {
                    display_name: "Bot".to_string(),
                    flags: author_flags::IS_BOT,
                },
            )
            .unwrap();
        assert_eq!(author.flags & author_flags::IS_BOT, author_flags::IS_BOT);
        assert_eq!(db.find_author(author.id).unwrap(), Some(author));
    }

    #[test]
    fn test_reply_to_back_fill() {
        let (db, channel) = seeded();
        let author = db
            .find_or_create_author(&AuthorKey::new(Platform::Discord, "42"), &defaults("Ann"))
            .unwrap();
        let first = db
            .create_message(&new_message(author.id, channel.id, Platform::Discord))
            .unwrap();
        let second = db
            .create_message(&new_message(author.id, channel.id, Platform::Discord))
            .unwrap();
        assert_eq!(second.reply_to_id, None);

        db.update_message_reply_to(second.id, first.id).unwrap();

        let reloaded = db.find_message(second.id).unwrap().unwrap();
        assert_eq!(reloaded.reply_to_id, Some(first.id));
        assert_eq!(reloaded.original_platform, Platform::Discord);
    }

    #[test]
    fn test_update_missing_message_fails() {
        let (db, _) = seeded();
        let result = db.update_message_reply_to(404, 1);
        assert!(matches!(result, Err(StoreError::NotFound { entity: "message", id: 404 })));
    }

    #[test]
    fn test_platform_message_lookups() {
        let (db, channel) = seeded();
        let author = db
            .find_or_create_author(&AuthorKey::new(Platform::Discord, "42"), &defaults("Ann"))
            .unwrap();
        let message = db
            .create_message(&new_message(author.id, channel.id, Platform::Discord))
            .unwrap();

        for (platform, native_id, kind) in [
            (Platform::Discord, "d1", PlatformMessageType::Message),
            (Platform::WhatsApp, "w0", PlatformMessageType::ReplyIndicator),
            (Platform::WhatsApp, "w1", PlatformMessageType::Message),
            (Platform::WhatsApp, "w2", PlatformMessageType::SplitMessage),
        ] {
            db.create_platform_message(&NewPlatformMessage {
                message_id: message.id,
                platform,
                native_id: native_id.to_string(),
                kind,
            })
            .unwrap();
        }

        let found = db
            .find_platform_message_by_native_id(Platform::WhatsApp, "w2")
            .unwrap()
            .unwrap();
        assert_eq!(found.message_id, message.id);
        assert_eq!(found.kind, PlatformMessageType::SplitMessage);
        assert!(db
            .find_platform_message_by_native_id(Platform::Discord, "w2")
            .unwrap()
            .is_none());

        let canonical = db
            .find_platform_message(
                message.id,
                Platform::WhatsApp,
                &PlatformMessageType::CANONICAL,
            )
            .unwrap()
            .unwrap();
        assert_eq!(canonical.native_id, "w1");

        assert!(db
            .find_platform_message(message.id, Platform::Discord, &[PlatformMessageType::System])
            .unwrap()
            .is_none());
        assert!(db
            .find_platform_message(message.id, Platform::Discord, &[])
            .unwrap()
            .is_none());

        let all: Vec<String> = db
            .platform_messages_for(message.id)
            .unwrap()
            .into_iter()
            .map(|pm| pm.native_id)
            .collect();
        assert_eq!(all, vec!["d1", "w0", "w1", "w2"]);
    }

    #[test]
    fn test_stats() {
        let (db, channel) = seeded();
        let author = db
            .find_or_create_author(&AuthorKey::new(Platform::WhatsApp, "316"), &defaults("Bo"))
            .unwrap();

        db.create_message(&new_message(author.id, channel.id, Platform::Discord))
            .unwrap();
        for size in [1_000, 2_500] {
            db.create_message(&NewMessage {
                attachment_kind: Some(AttachmentKind::Image),
                attachment_size: Some(size),
                ..new_message(author.id, channel.id, Platform::WhatsApp)
            })
            .unwrap();
        }

        assert_eq!(
            db.stats().unwrap(),
            BridgeStats {
                discord_messages: 1,
                whatsapp_messages: 2,
                total_attachment_bytes: 3_500,
            }
        );
    }
}
