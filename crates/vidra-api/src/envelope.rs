use axum::{Json, http::StatusCode};
use serde::Serialize;
use vidra_types::api::ApiResponse;

/// Wraps a successful payload in the uniform response envelope.
pub fn reply<T: Serialize>(
    status: StatusCode,
    data: T,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (status, Json(ApiResponse::ok(status.as_u16(), data, message)))
}
