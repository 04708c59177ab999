use std::str::FromStr;

use anyhow::Context;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    user_id         TEXT PRIMARY KEY,
    display_name    TEXT NOT NULL,
    contact_handle  TEXT,
    exchange_code   TEXT NOT NULL UNIQUE,
    pairing_id      TEXT,
    partner_user_id TEXT,
    partner_name    TEXT,
    online          INTEGER NOT NULL DEFAULT 0,
    created_at      INTEGER NOT NULL,
    CHECK ((pairing_id IS NULL) = (partner_user_id IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_profiles_pairing ON profiles(pairing_id);

CREATE TABLE IF NOT EXISTS messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    id              TEXT NOT NULL UNIQUE,
    pairing_id      TEXT NOT NULL,
    sender_id       TEXT NOT NULL,
    sender_name     TEXT NOT NULL,
    kind            TEXT NOT NULL,
    text            TEXT NOT NULL DEFAULT '',
    image_url       TEXT NOT NULL DEFAULT '',
    audio_url       TEXT NOT NULL DEFAULT '',
    drawing_url     TEXT NOT NULL DEFAULT '',
    timestamp       INTEGER NOT NULL,
    sent_at         INTEGER,
    delivery        INTEGER NOT NULL DEFAULT 0,
    client_token    TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_pairing_order ON messages(pairing_id, timestamp, seq);
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_client_token
    ON messages(pairing_id, sender_id, client_token) WHERE client_token IS NOT NULL;

CREATE TABLE IF NOT EXISTS reactions (
    message_id      TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    token           TEXT NOT NULL,
    PRIMARY KEY (message_id, user_id)
);

CREATE TABLE IF NOT EXISTS memories (
    id              TEXT PRIMARY KEY,
    pairing_id      TEXT NOT NULL,
    author_id       TEXT NOT NULL,
    author_name     TEXT NOT NULL,
    text            TEXT NOT NULL,
    timestamp       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_pairing ON memories(pairing_id, timestamp DESC);
"#;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("bad DATABASE_URL {database_url}"))?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await
        .context("failed to open the database")
}

/// Creates every table and index if missing. Safe to run on each start.
pub async fn migrate(db_pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(db_pool)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
