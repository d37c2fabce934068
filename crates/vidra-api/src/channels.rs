use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::envelope::reply;
use crate::error::ApiError;
use crate::middleware::Viewer;
use crate::session::Actor;
use crate::state::AppState;

/// Public channel page; `is_subscribed` is only ever true for a signed-in
/// viewer.
pub async fn channel_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(Viewer(viewer)): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer_id = viewer.map(|actor| actor.id);
    let profile = state.projections.channel_profile(&username, viewer_id).await?;
    Ok(reply(StatusCode::OK, profile, "User channel fetched successfully"))
}

pub async fn watch_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.projections.watch_history(actor.id).await?;
    Ok(reply(StatusCode::OK, history, "Watch history fetched successfully"))
}
