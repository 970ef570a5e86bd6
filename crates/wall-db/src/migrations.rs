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

            CREATE TABLE events (
                code        TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT,
                created_at  TEXT NOT NULL
            );

            -- channel_id is deliberately not a foreign key: a channel is just
            -- the set of messages that share it.
            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                channel_id  TEXT NOT NULL,
                text        TEXT NOT NULL DEFAULT '',
                sender_name TEXT,
                created_at  TEXT NOT NULL,
                pinned      INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_channel
                ON messages(channel_id, created_at, id);

            CREATE INDEX idx_messages_channel_pinned
                ON messages(channel_id, pinned, created_at, id);

            CREATE TABLE message_images (
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                image_key   TEXT NOT NULL,
                PRIMARY KEY (message_id, position)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
