use crate::Database;
use crate::models::{
    InsertOutcome, NewUser, NewVideo, PublicUserRow, RotateOutcome, UserRow, VideoRow, VideoTotals,
};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, ffi, params};
use tracing::debug;
use vidra_types::models::RelationshipKind;

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, password, refresh_token_hash, created_at";

const VIDEO_COLUMNS: &str = "v.id, v.title, v.description, v.video_file, v.thumbnail, v.duration, v.views, v.is_published, v.created_at, u.id, u.username, u.full_name, u.avatar";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<InsertOutcome> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO users (id, username, email, full_name, avatar, cover_image, password)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.full_name,
                    user.avatar,
                    user.cover_image,
                    user.password_hash
                ],
            );
            insert_outcome(result)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Case-insensitive, the column is declared `COLLATE NOCASE`.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", username))
    }

    /// Resolves a login identifier that may be either a username or an email.
    pub fn get_user_by_login(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1 OR email = ?1", identifier))
    }

    pub fn username_or_email_taken(&self, username: &str, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1 OR email = ?2 LIMIT 1",
                    params![username, email],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            Ok(taken)
        })
    }

    /// Overwrites (or clears, with `None`) the stored refresh token hash.
    /// Returns `false` when no such user exists.
    pub fn set_refresh_token_hash(&self, user_id: &str, hash: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token_hash = ?2 WHERE id = ?1",
                params![user_id, hash],
            )?;
            Ok(changed > 0)
        })
    }

    /// Atomic compare-and-swap of the stored refresh token hash. Two racing
    /// rotations presenting the same token can never both succeed.
    pub fn rotate_refresh_token_hash(
        &self,
        user_id: &str,
        expected: &str,
        replacement: &str,
    ) -> Result<RotateOutcome> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token_hash = ?3 WHERE id = ?1 AND refresh_token_hash = ?2",
                params![user_id, expected, replacement],
            )?;
            if changed > 0 {
                return Ok(RotateOutcome::Rotated);
            }

            let exists = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [user_id], |_| Ok(()))
                .optional()?
                .is_some();
            Ok(if exists {
                RotateOutcome::Stale
            } else {
                RotateOutcome::UserMissing
            })
        })
    }

    /// Removes a user together with everything that hangs off it: owned
    /// videos (and their comments and likes), the user's comments and
    /// tweets, every edge the user is actor of, every subscription to the
    /// user's channel and the watch history.
    pub fn delete_user(&self, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let video_ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM videos WHERE owner_id = ?1")?;
                stmt.query_map([user_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            for video_id in &video_ids {
                delete_video_cascade(&tx, video_id)?;
            }

            tx.execute(
                "DELETE FROM relationships WHERE kind = 'comment'
                 AND target_id IN (SELECT id FROM comments WHERE owner_id = ?1)",
                [user_id],
            )?;
            tx.execute("DELETE FROM comments WHERE owner_id = ?1", [user_id])?;
            tx.execute(
                "DELETE FROM relationships WHERE kind = 'tweet'
                 AND target_id IN (SELECT id FROM tweets WHERE owner_id = ?1)",
                [user_id],
            )?;
            tx.execute("DELETE FROM tweets WHERE owner_id = ?1", [user_id])?;
            let edges = tx.execute(
                "DELETE FROM relationships WHERE actor_id = ?1 OR (kind = 'channel' AND target_id = ?1)",
                [user_id],
            )?;
            tx.execute("DELETE FROM watch_history WHERE user_id = ?1", [user_id])?;
            let removed = tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;

            tx.commit()?;
            debug!(
                "Deleted user {} ({} videos, {} edges)",
                user_id,
                video_ids.len(),
                edges
            );
            Ok(removed > 0)
        })
    }

    // -- Relationships --

    pub fn find_relationship(
        &self,
        actor_id: &str,
        target_id: &str,
        kind: RelationshipKind,
    ) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT id FROM relationships WHERE actor_id = ?1 AND target_id = ?2 AND kind = ?3",
                    params![actor_id, target_id, kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        })
    }

    pub fn insert_relationship(
        &self,
        id: &str,
        actor_id: &str,
        target_id: &str,
        kind: RelationshipKind,
    ) -> Result<InsertOutcome> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO relationships (id, actor_id, target_id, kind) VALUES (?1, ?2, ?3, ?4)",
                params![id, actor_id, target_id, kind.as_str()],
            );
            insert_outcome(result)
        })
    }

    /// Deletes by tuple rather than by row id so a concurrent delete of the
    /// same edge is a harmless no-op. Returns whether a row was removed.
    pub fn delete_relationship(
        &self,
        actor_id: &str,
        target_id: &str,
        kind: RelationshipKind,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM relationships WHERE actor_id = ?1 AND target_id = ?2 AND kind = ?3",
                params![actor_id, target_id, kind.as_str()],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn count_relationships_to(&self, target_id: &str, kind: RelationshipKind) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM relationships WHERE target_id = ?1 AND kind = ?2",
                params![target_id, kind.as_str()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn count_relationships_from(&self, actor_id: &str, kind: RelationshipKind) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM relationships WHERE actor_id = ?1 AND kind = ?2",
                params![actor_id, kind.as_str()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Likes across every video owned by `owner_id`.
    pub fn count_likes_on_owned_videos(&self, owner_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM relationships
                 WHERE kind = 'video' AND target_id IN (SELECT id FROM videos WHERE owner_id = ?1)",
                [owner_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Comments across every video owned by `owner_id`.
    pub fn count_comments_on_owned_videos(&self, owner_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM comments
                 WHERE video_id IN (SELECT id FROM videos WHERE owner_id = ?1)",
                [owner_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Users subscribed to `channel_id`, newest subscription first.
    pub fn list_subscribers(&self, channel_id: &str) -> Result<Vec<PublicUserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.full_name, u.avatar
                 FROM relationships r
                 JOIN users u ON u.id = r.actor_id
                 WHERE r.target_id = ?1 AND r.kind = 'channel'
                 ORDER BY r.created_at DESC, r.rowid DESC",
            )?;
            let rows = stmt
                .query_map([channel_id], map_public_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Channels `subscriber_id` is subscribed to, newest subscription first.
    pub fn list_subscriptions(&self, subscriber_id: &str) -> Result<Vec<PublicUserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.full_name, u.avatar
                 FROM relationships r
                 JOIN users u ON u.id = r.target_id
                 WHERE r.actor_id = ?1 AND r.kind = 'channel'
                 ORDER BY r.created_at DESC, r.rowid DESC",
            )?;
            let rows = stmt
                .query_map([subscriber_id], map_public_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Videos liked by `actor_id`, newest like first. Likes pointing at
    /// videos that no longer exist are skipped by the join.
    pub fn liked_videos(&self, actor_id: &str) -> Result<Vec<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VIDEO_COLUMNS}
                 FROM relationships r
                 JOIN videos v ON v.id = r.target_id
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE r.actor_id = ?1 AND r.kind = 'video'
                 ORDER BY r.created_at DESC, r.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([actor_id], map_video)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Content --

    pub fn insert_video(&self, video: &NewVideo<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO videos (id, owner_id, title, description, video_file, thumbnail, duration, views, is_published)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    video.id,
                    video.owner_id,
                    video.title,
                    video.description,
                    video.video_file,
                    video.thumbnail,
                    video.duration,
                    video.views,
                    video.is_published
                ],
            )?;
            Ok(())
        })
    }

    pub fn insert_comment(&self, id: &str, video_id: &str, owner_id: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, video_id, owner_id, content) VALUES (?1, ?2, ?3, ?4)",
                params![id, video_id, owner_id, content],
            )?;
            Ok(())
        })
    }

    pub fn insert_tweet(&self, id: &str, owner_id: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tweets (id, owner_id, content) VALUES (?1, ?2, ?3)",
                params![id, owner_id, content],
            )?;
            Ok(())
        })
    }

    /// Every video owned by `owner_id`, published or not, newest first.
    pub fn videos_by_owner(&self, owner_id: &str) -> Result<Vec<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VIDEO_COLUMNS}
                 FROM videos v
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE v.owner_id = ?1
                 ORDER BY v.created_at DESC, v.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner_id], map_video)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn video_totals(&self, owner_id: &str) -> Result<VideoTotals> {
        self.with_conn(|conn| {
            let totals = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(views), 0) FROM videos
                     WHERE owner_id = ?1 GROUP BY owner_id",
                    [owner_id],
                    |row| {
                        Ok(VideoTotals {
                            count: row.get(0)?,
                            views: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(totals.unwrap_or_default())
        })
    }

    pub fn target_exists(&self, kind: RelationshipKind, id: &str) -> Result<bool> {
        let table = match kind {
            RelationshipKind::Video => "videos",
            RelationshipKind::Comment => "comments",
            RelationshipKind::Tweet => "tweets",
            RelationshipKind::Channel => "users",
        };
        self.with_conn(|conn| {
            let exists = conn
                .query_row(&format!("SELECT 1 FROM {table} WHERE id = ?1"), [id], |_| Ok(()))
                .optional()?
                .is_some();
            Ok(exists)
        })
    }

    /// Removes a video with its comments, every like on the video or its
    /// comments, and its watch-history entries.
    pub fn delete_video(&self, video_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = delete_video_cascade(&tx, video_id)?;
            tx.commit()?;
            Ok(removed)
        })
    }

    // -- Watch history --

    pub fn append_watch_history(&self, user_id: &str, video_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO watch_history (user_id, video_id, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM watch_history WHERE user_id = ?1))",
                params![user_id, video_id],
            )?;
            Ok(())
        })
    }

    /// The user's history in the order it was recorded.
    pub fn watch_history(&self, user_id: &str) -> Result<Vec<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {VIDEO_COLUMNS}
                 FROM watch_history h
                 JOIN videos v ON v.id = h.video_id
                 LEFT JOIN users u ON u.id = v.owner_id
                 WHERE h.user_id = ?1
                 ORDER BY h.position ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_video)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}"))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                full_name: row.get(3)?,
                avatar: row.get(4)?,
                cover_image: row.get(5)?,
                password: row.get(6)?,
                refresh_token_hash: row.get(7)?,
                created_at: row.get(8)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn delete_video_cascade(conn: &Connection, video_id: &str) -> Result<bool> {
    conn.execute(
        "DELETE FROM relationships WHERE kind = 'comment'
         AND target_id IN (SELECT id FROM comments WHERE video_id = ?1)",
        [video_id],
    )?;
    conn.execute("DELETE FROM comments WHERE video_id = ?1", [video_id])?;
    conn.execute(
        "DELETE FROM relationships WHERE kind = 'video' AND target_id = ?1",
        [video_id],
    )?;
    conn.execute("DELETE FROM watch_history WHERE video_id = ?1", [video_id])?;
    let removed = conn.execute("DELETE FROM videos WHERE id = ?1", [video_id])?;
    Ok(removed > 0)
}

fn map_public_user(row: &Row<'_>) -> rusqlite::Result<PublicUserRow> {
    Ok(PublicUserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        avatar: row.get(3)?,
    })
}

/// Maps a row selected with `VIDEO_COLUMNS`.
fn map_video(row: &Row<'_>) -> rusqlite::Result<VideoRow> {
    let owner = match row.get::<_, Option<String>>(9)? {
        Some(id) => Some(PublicUserRow {
            id,
            username: row.get(10)?,
            full_name: row.get(11)?,
            avatar: row.get(12)?,
        }),
        None => None,
    };

    Ok(VideoRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        video_file: row.get(3)?,
        thumbnail: row.get(4)?,
        duration: row.get(5)?,
        views: row.get(6)?,
        is_published: row.get(7)?,
        created_at: row.get(8)?,
        owner,
    })
}

fn insert_outcome(result: rusqlite::Result<usize>) -> Result<InsertOutcome> {
    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Conflict),
        Err(e) => Err(e.into()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}
