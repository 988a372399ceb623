use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const SCHEMA_VERSION: i64 = 1;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                image_url   TEXT NOT NULL DEFAULT '',
                email       TEXT,
                last_seen   INTEGER,
                created_at  INTEGER NOT NULL
            );

            -- direct_key is the sorted member pair for 1:1 chats, NULL for groups.
            -- The UNIQUE index is what makes racing direct-chat creation safe.
            CREATE TABLE conversations (
                id                TEXT PRIMARY KEY,
                is_group          INTEGER NOT NULL,
                name              TEXT,
                direct_key        TEXT UNIQUE,
                created_at        INTEGER NOT NULL,
                last_message_time INTEGER
            );

            CREATE TABLE conversation_members (
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                user_id         TEXT NOT NULL REFERENCES users(id),
                position        INTEGER NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX idx_members_user
                ON conversation_members(user_id);

            CREATE TABLE messages (
                id                TEXT PRIMARY KEY,
                conversation_id   TEXT NOT NULL REFERENCES conversations(id),
                sender_id         TEXT NOT NULL REFERENCES users(id),
                content           TEXT NOT NULL,
                created_at        INTEGER NOT NULL,
                edited_at         INTEGER,
                deleted_at        INTEGER,
                reply_to_id       TEXT,
                reply_sender_name TEXT,
                reply_content     TEXT,
                reply_is_deleted  INTEGER,
                idempotency_key   TEXT
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at, id);

            CREATE UNIQUE INDEX idx_messages_idempotency
                ON messages(sender_id, idempotency_key)
                WHERE idempotency_key IS NOT NULL;

            -- One row per (message, user): the at-most-one-reaction invariant.
            CREATE TABLE reactions (
                message_id  TEXT NOT NULL REFERENCES messages(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                emoji       TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE read_receipts (
                user_id         TEXT NOT NULL REFERENCES users(id),
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                last_read_at    INTEGER NOT NULL,
                PRIMARY KEY (user_id, conversation_id)
            );

            CREATE TABLE typing (
                user_id         TEXT NOT NULL REFERENCES users(id),
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                user_name       TEXT NOT NULL,
                expires_at      INTEGER NOT NULL,
                PRIMARY KEY (user_id, conversation_id)
            );

            CREATE INDEX idx_typing_conversation
                ON typing(conversation_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete (schema v{})", SCHEMA_VERSION);
    Ok(())
}
