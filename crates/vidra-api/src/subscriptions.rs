use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use vidra_types::api::SubscribeToggleResponse;
use vidra_types::models::RelationshipKind;

use crate::convert;
use crate::envelope::reply;
use crate::error::ApiError;
use crate::session::Actor;
use crate::state::AppState;

/// POST /subscriptions/c/{id}: `id` is the channel to (un)subscribe.
pub async fn toggle_subscription(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let channel_id = convert::parse_id(&channel_id, "channel")?;

    let toggle = state
        .relationships
        .toggle(actor.id, channel_id, RelationshipKind::Channel)
        .await?;

    Ok(reply(
        StatusCode::OK,
        SubscribeToggleResponse {
            is_subscribed: toggle.is_active,
            subscribers_count: toggle.total_count,
        },
        "Subscription toggled successfully",
    ))
}

/// GET /subscriptions/u/{id}: subscribers of channel `id`.
pub async fn channel_subscribers(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let channel_id = convert::parse_id(&channel_id, "channel")?;
    let subscribers = state.projections.channel_subscribers(channel_id).await?;
    Ok(reply(
        StatusCode::OK,
        subscribers,
        "Channel subscribers fetched successfully",
    ))
}

/// GET /subscriptions/c/{id}: channels that user `id` subscribes to.
pub async fn subscribed_channels(
    State(state): State<AppState>,
    Path(subscriber_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let subscriber_id = convert::parse_id(&subscriber_id, "user")?;
    let channels = state.projections.subscribed_channels(subscriber_id).await?;
    Ok(reply(
        StatusCode::OK,
        channels,
        "Subscribed channels fetched successfully",
    ))
}
