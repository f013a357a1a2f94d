use anyhow::{Context, Result};
use axum::serve;
use rfid_store::core::config::Config;
use rfid_store::core::error::RfidError;
use rfid_store::core::state::AppState;
use rfid_store::manager::{CardManager, LoadOutcome, ManagerOptions};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, error, info, warn, Level};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // Load and validate configuration
    let config = Config::from_file(&config_path)
        .context(format!(
            "Failed to load configuration from '{}'. \
            If this is your first run, copy config.example.toml to config.toml and adjust the values.",
            config_path.display()
        ))?;

    rfid_store::core::tracing_init::init_tracing(&config.logging)?;

    // Build Tokio runtime with configured number of threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        port = config.server.port,
        num_threads = config.server.num_threads,
        storage_path = %config.storage.path.display(),
        image_format = ?config.storage.format,
        cache_timeout_ms = config.cache.timeout_ms,
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "RFID card store starting"
    );

    // Opening the store reads and possibly rewrites the image
    let options = ManagerOptions::from_config(&config);
    let (manager, outcome, cards) = tokio::task::spawn_blocking(move || {
        let (manager, outcome) = CardManager::init(options)?;
        let cards = manager.get_card_count()?;
        Ok::<_, RfidError>((manager, outcome, cards))
    })
        .await
        .context("Card manager initialization task failed")?
        .context("Failed to initialize card manager")?;

    match outcome {
        LoadOutcome::Restored => info!("Card database restored"),
        LoadOutcome::DefaultsFirstBoot => info!("No card database found, started with defaults"),
        LoadOutcome::DefaultsAfterCorruption => {
            warn!("Card database was corrupt, started with defaults")
        }
    }

    let state = Arc::new(AppState::new(config.clone(), manager));

    let driver = spawn_process_task(
        Arc::clone(&state.manager),
        config.cache.process_interval_ms,
    );

    info!(
        cards,
        process_interval_ms = config.cache.process_interval_ms,
        "RFID card store startup complete"
    );

    // Build the router with middleware
    let app = rfid_store::core::routes::build_router(Arc::clone(&state))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
                )
        );

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = TcpListener::bind(&addr).await
        .context(format!("Failed to bind TCP listener to {}", addr))?;

    info!(address = %addr, "HTTP server started, waiting for shutdown signal");

    let served = serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    info!("Shutting down gracefully");

    driver.abort();
    let _ = driver.await;

    // Whatever the debounce window still holds goes to flash now
    let manager = Arc::clone(&state.manager);
    match tokio::task::spawn_blocking(move || manager.flush_cache()).await {
        Ok(Ok(())) => info!("Card cache flushed on shutdown"),
        Ok(Err(e)) => error!(error = %e, "Failed to flush card cache on shutdown"),
        Err(e) => error!(error = %e, "Shutdown flush task failed"),
    }

    served
}

/// Spawn the periodic driver that performs deferred writes
fn spawn_process_task(manager: Arc<CardManager>, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));

        loop {
            interval.tick().await;

            let manager = Arc::clone(&manager);
            match tokio::task::spawn_blocking(move || manager.process()).await {
                Ok(true) => debug!("Deferred card write completed"),
                Ok(false) => {}
                Err(e) => error!(error = %e, "Write-back driver task failed"),
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
