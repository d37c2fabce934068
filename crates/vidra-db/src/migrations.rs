use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, content, relationships)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE COLLATE NOCASE,
                email               TEXT NOT NULL UNIQUE COLLATE NOCASE,
                full_name           TEXT NOT NULL,
                avatar              TEXT NOT NULL,
                cover_image         TEXT NOT NULL DEFAULT '',
                password            TEXT NOT NULL,
                refresh_token_hash  TEXT,
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE videos (
                id              TEXT PRIMARY KEY,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                title           TEXT NOT NULL,
                description     TEXT NOT NULL,
                video_file      TEXT NOT NULL,
                thumbnail       TEXT NOT NULL,
                duration        REAL NOT NULL,
                views           INTEGER NOT NULL DEFAULT 0,
                is_published    INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_videos_owner ON videos(owner_id, created_at);

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                video_id    TEXT NOT NULL REFERENCES videos(id),
                owner_id    TEXT NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_comments_video ON comments(video_id);

            CREATE TABLE tweets (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            -- One row per edge. The UNIQUE constraint is the only guard
            -- against duplicate edges from racing toggles.
            CREATE TABLE relationships (
                id          TEXT PRIMARY KEY,
                actor_id    TEXT NOT NULL,
                target_id   TEXT NOT NULL,
                kind        TEXT NOT NULL CHECK (kind IN ('video', 'comment', 'tweet', 'channel')),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(actor_id, target_id, kind)
            );

            CREATE INDEX idx_relationships_target ON relationships(target_id, kind);
            CREATE INDEX idx_relationships_actor ON relationships(actor_id, kind);

            CREATE TABLE watch_history (
                user_id     TEXT NOT NULL REFERENCES users(id),
                video_id    TEXT NOT NULL,
                position    INTEGER NOT NULL,
                PRIMARY KEY (user_id, position)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
