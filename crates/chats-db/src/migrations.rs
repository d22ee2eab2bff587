use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                username      TEXT NOT NULL UNIQUE,
                password      TEXT NOT NULL,
                is_active     INTEGER NOT NULL DEFAULT 1,
                is_staff      INTEGER NOT NULL DEFAULT 0,
                is_superuser  INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE user_profiles (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                first_name       TEXT NOT NULL,
                last_name        TEXT NOT NULL,
                caption          TEXT,
                about            TEXT,
                profile_picture  TEXT,
                created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE token_pairs (
                user_id     TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                access      TEXT NOT NULL,
                refresh     TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE messages (
                id           TEXT PRIMARY KEY,
                sender_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                message      TEXT NOT NULL,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
            CREATE INDEX idx_messages_receiver ON messages(receiver_id, created_at);

            CREATE TABLE message_attachments (
                id          TEXT PRIMARY KEY,
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                attachment  TEXT NOT NULL CHECK (length(attachment) > 0),
                caption     TEXT,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_attachments_message ON message_attachments(message_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
