//! SQLite row types. Kept apart from the vidra-types wire models so the
//! storage layer does not depend on the API shape.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: String,
    pub password: String,
    pub refresh_token_hash: Option<String>,
    pub created_at: String,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub avatar: &'a str,
    pub cover_image: &'a str,
    pub password_hash: &'a str,
}

pub struct PublicUserRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

/// A video joined with its (single) owner. Owner columns are `None` when
/// the owner row no longer exists.
pub struct VideoRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub video_file: String,
    pub thumbnail: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub created_at: String,
    pub owner: Option<PublicUserRow>,
}

pub struct NewVideo<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub video_file: &'a str,
    pub thumbnail: &'a str,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
}

/// Video count and summed views for one owner, from a single grouped scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoTotals {
    pub count: i64,
    pub views: i64,
}

/// Result of an insert guarded by a UNIQUE constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another row already holds the unique key.
    Conflict,
}

/// Result of the compare-and-swap on a user's stored refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    Rotated,
    /// The user exists but the stored value no longer matches.
    Stale,
    UserMissing,
}
