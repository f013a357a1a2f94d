// HTTP routes configuration

use crate::core::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::handlers::health::health_handler))

        // Card database
        .route(
            "/api/rfid/cards",
            get(crate::handlers::cards::list_cards_handler)
                .post(crate::handlers::cards::add_card_handler)
                .delete(crate::handlers::cards::remove_card_handler),
        )
        .route("/api/rfid/cards/count", get(crate::handlers::cards::count_cards_handler))
        .route("/api/rfid/cards/check", post(crate::handlers::cards::check_card_handler))
        .route("/api/rfid/reset", post(crate::handlers::cards::reset_handler))

        // 404 fallback for all unmatched routes
        .fallback(crate::handlers::fallback::fallback_handler)

        .with_state(state)
}
