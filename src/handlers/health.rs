use crate::cache::coordinator::CacheState;
use crate::core::state::AppState;
use crate::handlers::cards::with_manager;
use crate::utils::time::current_timestamp;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    /// Unflushed changes are held in memory
    pub dirty: bool,
}

/// Health check handler
///
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // A lock timeout reads as dirty, the store is busy
    let dirty = with_manager(&state, |manager| manager.cache_state())
        .await
        .map(|cache| cache != CacheState::Clean)
        .unwrap_or(true);

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            timestamp: current_timestamp(),
            dirty,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::manager::{CardManager, ManagerOptions};
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_health_response_has_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_toml("[server]\nport = 8080\n[logging]\n").unwrap();
        let (manager, _) =
            CardManager::init(ManagerOptions::new(temp_dir.path().join("cards.dat"))).unwrap();
        let state = Arc::new(AppState::new(config, manager));

        let response = health_handler(State(state)).await.into_response();

        let (parts, body) = response.into_parts();
        assert_eq!(parts.status, StatusCode::OK);

        let body = Body::new(body);
        let bytes = body.collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(health.status, "ok");
        assert!(health.timestamp > 0);
        assert!(!health.dirty);
    }

    #[tokio::test]
    async fn test_held_lock_does_not_block_runtime() {
        use std::sync::mpsc;
        use std::time::{Duration, Instant};

        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_toml("[server]\nport = 8080\n[logging]\n").unwrap();
        let mut options = ManagerOptions::new(temp_dir.path().join("cards.dat"));
        options.lock_timeouts.operation = Duration::from_millis(400);
        let (manager, _) = CardManager::init(options).unwrap();
        let state = Arc::new(AppState::new(config, manager));

        let holder = Arc::clone(&state.manager);
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let locker = std::thread::spawn(move || {
            holder.hold_lock_until(|| {
                locked_tx.send(()).unwrap();
                let _ = release_rx.recv();
            });
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let health = tokio::spawn(health_handler(State(Arc::clone(&state))));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(200));

        release_tx.send(()).unwrap();
        let response = health.await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::OK);
        locker.join().unwrap();
    }
}
