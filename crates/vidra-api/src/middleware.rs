use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::error::ApiError;
use crate::session::Actor;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Pulls the bearer credential from the `accessToken` cookie, falling back
/// to an `Authorization: Bearer` header.
pub fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = CookieJar::from_headers(headers).get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

/// Rejects the request unless it carries a valid access token; on success
/// the resolved `Actor` is placed in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = bearer_credential(req.headers());
    let actor = state.sessions.authenticate(credential.as_deref()).await?;

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

/// Who is looking at a public page, if anyone.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<Actor>);

/// Like `require_auth`, but anonymous or badly authenticated requests pass
/// through as `Viewer(None)`.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let actor = match bearer_credential(req.headers()) {
        Some(credential) => state.sessions.authenticate(Some(&credential)).await.ok(),
        None => None,
    };

    req.extensions_mut().insert(Viewer(actor));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; accessToken=from-cookie"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));

        assert_eq!(bearer_credential(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn header_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(bearer_credential(&headers).as_deref(), Some("from-header"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_credential(&headers), None);
    }
}
