use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

use crate::middleware::{optional_auth, require_auth};
use crate::state::AppState;
use crate::{auth, channels, dashboard, likes, subscriptions};

/// Every endpoint under `/api/v1`. Transport layers (tracing, CORS) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route(
            "/users/register",
            post(auth::register).layer(DefaultBodyLimit::max(auth::MAX_REGISTER_BODY)),
        )
        .route("/users/login", post(auth::login))
        .route("/users/refresh-token", post(auth::refresh));

    let viewer_routes = Router::new()
        .route("/users/c/{username}", get(channels::channel_profile))
        .layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    let protected_routes = Router::new()
        .route("/users/logout", post(auth::logout))
        .route("/users/current-user", get(auth::current_user))
        .route("/users/history", get(channels::watch_history))
        .route("/likes/toggle/v/{id}", post(likes::toggle_video_like))
        .route("/likes/toggle/c/{id}", post(likes::toggle_comment_like))
        .route("/likes/toggle/t/{id}", post(likes::toggle_tweet_like))
        .route("/likes/videos", get(likes::liked_videos))
        .route(
            "/subscriptions/c/{id}",
            post(subscriptions::toggle_subscription).get(subscriptions::subscribed_channels),
        )
        .route("/subscriptions/u/{id}", get(subscriptions::channel_subscribers))
        .route("/dashboard/stats", get(dashboard::channel_stats))
        .route("/dashboard/videos", get(dashboard::channel_videos))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest(
            "/api/v1",
            public_routes.merge(viewer_routes).merge(protected_routes),
        )
        .with_state(state)
}
