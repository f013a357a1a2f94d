use crate::core::error::ApiError;
use crate::core::state::AppState;
use crate::manager::CardManager;
use crate::models::api::{
    AddCardRequest, CheckCardRequest, CheckCardResponse, CountResponse, RemoveCardQuery,
    SuccessResponse,
};
use crate::stores::card_table::format_id;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

/// Run a store call off the async workers
///
/// Every manager call may wait on the table lock or write the image, so none
/// of them run directly on a runtime thread.
pub(crate) async fn with_manager<T, F>(state: &AppState, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&CardManager) -> Result<T, crate::core::error::RfidError> + Send + 'static,
{
    let manager = Arc::clone(&state.manager);
    tokio::task::spawn_blocking(move || call(&manager))
        .await
        .map_err(|e| ApiError::InternalError(format!("store task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Parse a card identifier typed as `0x1234ABCD` or `305441741`
pub fn parse_card_id(raw: &str) -> Result<u32, ApiError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    };
    parsed.map_err(|_| ApiError::InvalidParameter(format!("invalid card id '{}'", raw)))
}

/// List all live cards
///
/// GET /api/rfid/cards
pub async fn list_cards_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let capacity = state.config.server.json_buffer_size;
    let body = with_manager(&state, move |manager| manager.render_as_json(capacity)).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// Grant a card access
///
/// POST /api/rfid/cards {"id": <u32>, "nm": "<holder>"}
pub async fn add_card_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddCardRequest>,
) -> Result<Response, ApiError> {
    let AddCardRequest { id, nm } = request;
    let name = nm.clone();
    if let Err(e) = with_manager(&state, move |manager| manager.add_card(id, &name)).await {
        warn!(card_id = %format_id(id), error = %e, "Card add rejected");
        return Err(e);
    }

    info!(card_id = %format_id(id), name = %nm, "Card added via API");

    Ok((StatusCode::OK, Json(SuccessResponse::ok("Card added successfully"))).into_response())
}

/// Revoke a card
///
/// DELETE /api/rfid/cards?id=<u32>
pub async fn remove_card_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RemoveCardQuery>,
) -> Result<Response, ApiError> {
    let id = params.id;
    with_manager(&state, move |manager| manager.remove_card(id)).await?;

    info!(card_id = %format_id(id), "Card removed via API");

    Ok((StatusCode::OK, Json(SuccessResponse::ok("Card removed successfully"))).into_response())
}

/// GET /api/rfid/cards/count
pub async fn count_cards_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let count = with_manager(&state, |manager| manager.get_card_count()).await?;
    Ok((StatusCode::OK, Json(CountResponse { count })).into_response())
}

/// Check whether a card is authorized
///
/// POST /api/rfid/cards/check {"card_id": "0x1234ABCD"}
pub async fn check_card_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckCardRequest>,
) -> Result<Response, ApiError> {
    let id = parse_card_id(&request.card_id)?;
    let exists = with_manager(&state, move |manager| manager.check_card(id)).await?;

    info!(card_id = %format_id(id), exists, "Card check via API");

    Ok((
        StatusCode::OK,
        Json(CheckCardResponse {
            exists,
            card_id: id.to_string(),
        }),
    )
        .into_response())
}

/// Replace every card with the defaults
///
/// POST /api/rfid/reset
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    with_manager(&state, |manager| manager.format_database()).await?;

    warn!("Card database reset via API");

    Ok((StatusCode::OK, Json(SuccessResponse::ok("Card database reset to defaults"))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::manager::ManagerOptions;
    use crate::stores::card_table::DEFAULT_CARDS;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tempfile::TempDir;

    fn create_test_state(temp_dir: &TempDir) -> Arc<AppState> {
        let config = Config::from_toml(
            r#"
            [server]
            port = 8080
            json_buffer_size = 256

            [logging]
            "#,
        )
        .unwrap();
        let (manager, _) =
            CardManager::init(ManagerOptions::new(temp_dir.path().join("rfid_cards.dat"))).unwrap();
        Arc::new(AppState::new(config, manager))
    }

    async fn body_json(response: Response) -> Value {
        let (_, body) = response.into_parts();
        let bytes = Body::new(body).collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn status_of(result: Result<Response, ApiError>) -> StatusCode {
        match result {
            Ok(response) => response.status(),
            Err(e) => e.into_response().status(),
        }
    }

    #[test]
    fn test_parse_card_id() {
        assert_eq!(parse_card_id("0x1234ABCD").unwrap(), 0x1234ABCD);
        assert_eq!(parse_card_id("0Xabcdef00").unwrap(), 0xABCDEF00);
        assert_eq!(parse_card_id("305441741").unwrap(), 305441741);
        assert_eq!(parse_card_id(" 42 ").unwrap(), 42);
        assert!(parse_card_id("").is_err());
        assert!(parse_card_id("0x").is_err());
        assert!(parse_card_id("0x1FFFFFFFF").is_err());
        assert!(parse_card_id("card").is_err());
    }

    #[tokio::test]
    async fn test_add_then_check() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(&temp_dir);

        let response = add_card_handler(
            State(Arc::clone(&state)),
            Json(AddCardRequest {
                id: 0xABCD1234,
                nm: "Test".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = check_card_handler(
            State(Arc::clone(&state)),
            Json(CheckCardRequest {
                card_id: "0xABCD1234".to_string(),
            }),
        )
        .await
        .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["exists"], true);
        assert_eq!(body["card_id"], "2882343476");
    }

    #[tokio::test]
    async fn test_add_errors_map_to_statuses() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(&temp_dir);
        let (admin, _) = DEFAULT_CARDS[0];

        let duplicate = add_card_handler(
            State(Arc::clone(&state)),
            Json(AddCardRequest {
                id: admin,
                nm: "Again".to_string(),
            }),
        )
        .await;
        assert_eq!(status_of(duplicate), StatusCode::CONFLICT);

        let invalid = add_card_handler(
            State(Arc::clone(&state)),
            Json(AddCardRequest {
                id: 0,
                nm: "Zero".to_string(),
            }),
        )
        .await;
        assert_eq!(status_of(invalid), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_full_table_is_insufficient_storage() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(&temp_dir);
        let capacity = state.manager.capacity();
        for id in 1..=(capacity - DEFAULT_CARDS.len()) as u32 {
            state.manager.add_card(id, "Filler").unwrap();
        }

        let full = add_card_handler(
            State(Arc::clone(&state)),
            Json(AddCardRequest {
                id: 0xFEEDBEEF,
                nm: "Late".to_string(),
            }),
        )
        .await;
        assert_eq!(status_of(full), StatusCode::INSUFFICIENT_STORAGE);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(&temp_dir);

        let result = remove_card_handler(
            State(Arc::clone(&state)),
            Query(RemoveCardQuery { id: 0x0BADCAFE }),
        )
        .await;
        assert_eq!(status_of(result), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_check_rejects_unparsable_id() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(&temp_dir);

        let result = check_card_handler(
            State(state),
            Json(CheckCardRequest {
                card_id: "not-a-card".to_string(),
            }),
        )
        .await;
        assert_eq!(status_of(result), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(&temp_dir);

        let response = list_cards_handler(State(Arc::clone(&state))).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["cards"].as_array().unwrap().len(), DEFAULT_CARDS.len());
        assert_eq!(body["cards"][0]["id"], "0x12345678");

        let response = count_cards_handler(State(Arc::clone(&state))).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["count"], DEFAULT_CARDS.len());
    }

    #[tokio::test]
    async fn test_list_overflow_is_internal_error() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(&temp_dir);
        for id in 1..=10u32 {
            state.manager.add_card(id, "Long enough holder name").unwrap();
        }

        let result = list_cards_handler(State(state)).await;
        assert_eq!(status_of(result), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let state = create_test_state(&temp_dir);
        state.manager.add_card(0x77, "Temporary").unwrap();

        let response = reset_handler(State(Arc::clone(&state))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.manager.get_card_count().unwrap(), DEFAULT_CARDS.len());
        assert!(state.manager.get_card(0x77).is_err());
    }
}
