use crate::core::error::ApiError;
use axum::response::{IntoResponse, Response};
use axum::http::{StatusCode, Uri};
use tracing::debug;

pub async fn fallback_handler(uri: Uri) -> Response {
    debug!(path = %uri.path(), "No route for request");

    let mut response = ApiError::InvalidParameter(
        "Invalid endpoint. Valid endpoints: /api/rfid/cards, /api/rfid/cards/count, \
         /api/rfid/cards/check, /api/rfid/reset, /health"
            .to_string(),
    )
    .into_response();
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
