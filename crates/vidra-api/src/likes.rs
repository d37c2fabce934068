use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use vidra_types::api::{ApiResponse, LikeToggleResponse};
use vidra_types::models::RelationshipKind;

use crate::blocking;
use crate::convert;
use crate::envelope::reply;
use crate::error::ApiError;
use crate::session::Actor;
use crate::state::AppState;

pub async fn toggle_video_like(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    toggle_like(&state, &actor, &video_id, RelationshipKind::Video).await
}

pub async fn toggle_comment_like(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    toggle_like(&state, &actor, &comment_id, RelationshipKind::Comment).await
}

pub async fn toggle_tweet_like(
    State(state): State<AppState>,
    Path(tweet_id): Path<String>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    toggle_like(&state, &actor, &tweet_id, RelationshipKind::Tweet).await
}

/// The engine leaves target existence to its callers for likeable kinds,
/// so it is checked here before the toggle.
async fn toggle_like(
    state: &AppState,
    actor: &Actor,
    raw_id: &str,
    kind: RelationshipKind,
) -> Result<(StatusCode, Json<ApiResponse<LikeToggleResponse>>), ApiError> {
    let label = match kind {
        RelationshipKind::Video => "Video",
        RelationshipKind::Comment => "Comment",
        RelationshipKind::Tweet => "Tweet",
        RelationshipKind::Channel => "Channel",
    };
    let target_id = convert::parse_id(raw_id, kind.as_str())?;

    let tid = target_id.to_string();
    if !blocking::run(&state.db, move |db| db.target_exists(kind, &tid)).await? {
        return Err(ApiError::TargetNotFound(label.into()));
    }

    let toggle = state.relationships.toggle(actor.id, target_id, kind).await?;

    Ok(reply(
        StatusCode::OK,
        LikeToggleResponse {
            is_liked: toggle.is_active,
            total_likes: toggle.total_count,
        },
        format!("{label} like toggled successfully"),
    ))
}

pub async fn liked_videos(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let videos = state.projections.liked_videos(actor.id).await?;
    Ok(reply(StatusCode::OK, videos, "Liked videos fetched successfully"))
}
