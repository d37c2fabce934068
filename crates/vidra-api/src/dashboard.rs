use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};

use crate::envelope::reply;
use crate::error::ApiError;
use crate::session::Actor;
use crate::state::AppState;

/// The signed-in actor's own channel figures.
pub async fn channel_stats(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.projections.channel_stats(actor.id).await?;
    Ok(reply(StatusCode::OK, stats, "Channel stats fetched successfully"))
}

pub async fn channel_videos(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let videos = state.projections.channel_videos(actor.id).await?;
    Ok(reply(StatusCode::OK, videos, "Channel videos fetched successfully"))
}
