//! Row-to-wire conversions. Stored ids and timestamps are trusted; a corrupt
//! value is logged and defaulted rather than failing the whole listing.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use vidra_db::models::{PublicUserRow, UserRow, VideoRow};
use vidra_types::models::{PublicUser, UserProfile, VideoSummary};

use crate::error::ApiError;

/// Parses an id taken from a request path.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid {what} ID")))
}

pub fn stored_id(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt stored id '{}': {}", raw, e);
        Uuid::default()
    })
}

pub fn stored_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand may use SQLite's "YYYY-MM-DD HH:MM:SS".
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt stored timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn user_profile(row: UserRow) -> UserProfile {
    UserProfile {
        id: stored_id(&row.id),
        username: row.username,
        email: row.email,
        full_name: row.full_name,
        avatar: row.avatar,
        cover_image: row.cover_image,
        created_at: stored_timestamp(&row.created_at),
    }
}

pub fn public_user(row: PublicUserRow) -> PublicUser {
    PublicUser {
        id: stored_id(&row.id),
        username: row.username,
        full_name: row.full_name,
        avatar: row.avatar,
    }
}

pub fn video_summary(row: VideoRow) -> VideoSummary {
    VideoSummary {
        id: stored_id(&row.id),
        title: row.title,
        description: row.description,
        video_file: row.video_file,
        thumbnail: row.thumbnail,
        duration: row.duration,
        views: row.views,
        is_published: row.is_published,
        created_at: stored_timestamp(&row.created_at),
        owner: row.owner.map(public_user),
    }
}
