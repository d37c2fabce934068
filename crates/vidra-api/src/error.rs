use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use vidra_types::api::ApiResponse;

/// Message shown to clients for every token failure. The precise cause is
/// only written to the server log.
const UNAUTHORIZED_MESSAGE: &str = "Unauthorized request";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    #[error("no credential presented or its subject no longer exists")]
    Unauthenticated,

    #[error("token expired")]
    TokenExpired,

    #[error("token signature or format invalid")]
    TokenInvalid,

    /// A cryptographically valid refresh token that is no longer the one
    /// stored for its user (logged out, or already exchanged).
    #[error("refresh token revoked or already used")]
    TokenRevoked,

    #[error("Invalid user credentials")]
    InvalidCredentials,

    #[error("User does not exist")]
    UserNotFound,

    /// The entity a relationship would point at does not exist.
    #[error("{0} not found")]
    TargetNotFound(String),

    #[error("{0}")]
    NotFound(String),

    /// A well-formed request for something that is never allowed, such as
    /// subscribing to one's own channel.
    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::TokenRevoked
            | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::UserNotFound | Self::TargetNotFound(_) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Persistence(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::TokenExpired | Self::TokenInvalid | Self::TokenRevoked
        )
    }

    fn client_message(&self) -> String {
        match self {
            e if e.is_token_failure() => UNAUTHORIZED_MESSAGE.to_string(),
            Self::Persistence(_) | Self::Unexpected(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_token_failure() {
            warn!("Rejected credential: {}", self);
        } else if matches!(self, Self::Persistence(_) | Self::Unexpected(_)) {
            error!("Request failed: {:?}", self);
        }

        let status = self.status();
        let body = ApiResponse::<()>::failure(status.as_u16(), self.client_message());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_causes_share_status_and_message() {
        for err in [
            ApiError::Unauthenticated,
            ApiError::TokenExpired,
            ApiError::TokenInvalid,
            ApiError::TokenRevoked,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.client_message(), UNAUTHORIZED_MESSAGE);
        }
    }

    #[test]
    fn internal_details_stay_out_of_the_message() {
        let err = ApiError::Persistence(anyhow::anyhow!("disk I/O error at /var/lib/vidra.db"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.client_message().contains("vidra.db"));
    }

    #[test]
    fn self_subscribe_is_a_bad_request() {
        let err = ApiError::InvalidOperation("You cannot subscribe to yourself".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "You cannot subscribe to yourself");
    }
}
