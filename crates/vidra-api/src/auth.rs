use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{info, warn};
use uuid::Uuid;

use vidra_db::models::{InsertOutcome, NewUser};
use vidra_types::api::{LoginRequest, LoginResponse, RefreshRequest, TokenPairResponse};

use crate::blob;
use crate::blocking;
use crate::convert;
use crate::envelope::reply;
use crate::error::ApiError;
use crate::middleware::{ACCESS_COOKIE, REFRESH_COOKIE};
use crate::session::Actor;
use crate::state::AppState;
use crate::tokens::TokenPair;

/// Largest accepted avatar or cover image.
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Body limit for the registration form: two images plus the text fields.
pub const MAX_REGISTER_BODY: usize = 2 * MAX_IMAGE_SIZE + 64 * 1024;

/// Registration arrives as `multipart/form-data`: text fields `username`,
/// `email`, `password`, `fullName` and file fields `avatar` (required) and
/// `coverImage` (optional). Images are staged under the configured upload
/// directory; nothing in the request names a server path.
#[derive(Default)]
struct RegisterForm {
    username: String,
    email: String,
    password: String,
    full_name: String,
    avatar: Option<Bytes>,
    cover_image: Option<Bytes>,
}

impl RegisterForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "username" => form.username = field.text().await.map_err(malformed)?,
                "email" => form.email = field.text().await.map_err(malformed)?,
                "password" => form.password = field.text().await.map_err(malformed)?,
                "fullName" => form.full_name = field.text().await.map_err(malformed)?,
                "avatar" => form.avatar = Some(read_image(field).await?),
                "coverImage" => form.cover_image = Some(read_image(field).await?),
                other => {
                    return Err(ApiError::Validation(format!(
                        "Unexpected form field '{other}'"
                    )));
                }
            }
        }

        Ok(form)
    }
}

async fn read_image(field: Field<'_>) -> Result<Bytes, ApiError> {
    let bytes = field.bytes().await.map_err(malformed)?;
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::Validation("Image must be at most 5 MB".into()));
    }
    Ok(bytes)
}

fn malformed(e: MultipartError) -> ApiError {
    warn!("Unreadable registration form: {}", e);
    ApiError::Validation("Malformed form data".into())
}

/// Stages `bytes` in the upload directory and hands the file to the blob
/// store.
async fn upload_image(state: &AppState, bytes: &[u8], what: &str) -> Result<String, ApiError> {
    let staged = blob::stage(&state.config.upload_dir, bytes)
        .await
        .map_err(|e| ApiError::Unexpected(format!("failed to stage {what}: {e}")))?;

    state.blobs.upload(&staged).await.map_err(|e| {
        warn!("Upload of {} failed: {}", what, e);
        ApiError::Validation(format!("Failed to upload {what}"))
    })
}

pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = RegisterForm::read(multipart).await?;

    let username = form.username.trim().to_lowercase();
    let email = form.email.trim().to_lowercase();
    let full_name = form.full_name.trim().to_string();

    if [&username, &email, &full_name, &form.password]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        return Err(ApiError::Validation("All fields are required".into()));
    }
    if !(3..=32).contains(&username.chars().count()) {
        return Err(ApiError::Validation(
            "Username must be between 3 and 32 characters".into(),
        ));
    }
    if form.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    let avatar_bytes = form
        .avatar
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::Validation("Avatar file is required".into()))?;

    let (u, e) = (username.clone(), email.clone());
    if blocking::run(&state.db, move |db| db.username_or_email_taken(&u, &e)).await? {
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    let avatar = upload_image(&state, &avatar_bytes, "avatar image").await?;
    let cover_image = match form.cover_image.filter(|b| !b.is_empty()) {
        Some(bytes) => upload_image(&state, &bytes, "cover image").await?,
        None => String::new(),
    };

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(form.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Unexpected(format!("failed to hash password: {e}")))?
        .to_string();

    let user_id = Uuid::new_v4();
    let uid = user_id.to_string();
    let (name, avatar_url, cover_url) = (username.clone(), avatar.clone(), cover_image.clone());
    let outcome = blocking::run(&state.db, move |db| {
        db.create_user(&NewUser {
            id: &uid,
            username: &name,
            email: &email,
            full_name: &full_name,
            avatar: &avatar_url,
            cover_image: &cover_url,
            password_hash: &password_hash,
        })
    })
    .await?;

    // Lost a race against a concurrent registration of the same name/email.
    if outcome == InsertOutcome::Conflict {
        warn!(
            "Registration of {} lost a race; orphaned blobs: avatar={} cover={}",
            username, avatar, cover_image
        );
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    let uid = user_id.to_string();
    let created = blocking::run(&state.db, move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or_else(|| ApiError::Unexpected("registered user could not be read back".into()))?;

    info!("Registered {} ({})", created.username, user_id);
    Ok(reply(
        StatusCode::CREATED,
        convert::user_profile(created),
        "User registered successfully",
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = req.identifier.trim().to_string();
    if identifier.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "Username or email and password are required".into(),
        ));
    }

    let user = blocking::run(&state.db, move |db| db.get_user_by_login(&identifier))
        .await?
        .ok_or(ApiError::UserNotFound)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Unexpected(format!("stored password hash unreadable: {e}")))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let user_id = convert::stored_id(&user.id);
    let pair = state.tokens.issue_token_pair(user_id).await?;

    info!("{} ({}) logged in", user.username, user_id);
    let jar = with_session_cookies(jar, &pair, state.config.cookie_secure);
    Ok((
        jar,
        reply(
            StatusCode::OK,
            LoginResponse {
                user: convert::user_profile(user),
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

/// Exchanges a refresh token from the `refreshToken` cookie (or, failing
/// that, the JSON body) for a rotated pair.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|_| ApiError::Validation("Malformed request body".into()))?
            .refresh_token
    };

    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or(from_body)
        .filter(|t| !t.trim().is_empty())
        .ok_or(ApiError::Unauthenticated)?;

    let pair = state.tokens.rotate_from_refresh_token(token.trim()).await?;

    let jar = with_session_cookies(jar, &pair, state.config.cookie_secure);
    Ok((
        jar,
        reply(
            StatusCode::OK,
            TokenPairResponse {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "Access token refreshed",
        ),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state.tokens.revoke(actor.id).await?;
    info!("{} ({}) logged out", actor.username, actor.id);

    let secure = state.config.cookie_secure;
    let jar = jar
        .add(expired_cookie(ACCESS_COOKIE, secure))
        .add(expired_cookie(REFRESH_COOKIE, secure));
    Ok((jar, reply(StatusCode::OK, serde_json::json!({}), "User logged out")))
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = actor.id.to_string();
    let user = blocking::run(&state.db, move |db| db.get_user_by_id(&uid))
        .await?
        .ok_or(ApiError::UserNotFound)?;

    Ok(reply(
        StatusCode::OK,
        convert::user_profile(user),
        "Current user fetched successfully",
    ))
}

fn with_session_cookies(jar: CookieJar, pair: &TokenPair, secure: bool) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, pair.access_token.clone(), secure))
        .add(session_cookie(REFRESH_COOKIE, pair.refresh_token.clone(), secure))
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Overwrites a session cookie with an empty, already expired one. Sent
/// whether or not the request carried the cookie.
fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), secure);
    cookie.make_removal();
    cookie
}
