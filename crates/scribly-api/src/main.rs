//! Scribly API server entry point.

use std::error::Error;
use std::sync::Arc;

use scribly_api::config::AppConfig;
use scribly_api::error::AppError;
use scribly_api::state::AppState;
use scribly_api::{build_router, telemetry};
use scribly_core::clock::{Clock, SystemClock};
use scribly_notifications::{LoggingEmailGateway, NotificationDispatcher, TokioSleeper};
use scribly_stories::application::command_handlers::StoryService;
use scribly_stories::application::emails::EmailComposer;
use scribly_stories::application::notifier::StoryNotifier;
use scribly_stories::application::verification::TokenCipher;
use scribly_store::PgStoryStore;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    info!(?config, "Starting Scribly API server");
    if config.uses_development_secret() {
        warn!("EMAIL_VERIFICATION_SECRET is not set; using the development key");
    }

    // Database and schema.
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(AppError::from)?;
    let store = Arc::new(PgStoryStore::new(pool));
    store
        .migrate()
        .await
        .map_err(|e| AppError::Migration(e.to_string()))?;

    // Service wiring.
    let cipher = TokenCipher::new(&config.verification_secret)
        .map_err(|e| AppError::Config(e.to_string()))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = Arc::new(StoryNotifier::new(
        store.clone(),
        EmailComposer::new(&config.website_url),
        Arc::new(LoggingEmailGateway),
        cipher.clone(),
        clock.clone(),
    ));
    let (dispatcher, dispatcher_handle) =
        NotificationDispatcher::spawn(notifier.clone(), config.dispatcher, Arc::new(TokioSleeper));
    let service = Arc::new(StoryService::new(store, clock, cipher, notifier, dispatcher));

    // TODO: Restrict CORS to WEBSITE_URL once the frontend is served from a fixed origin.
    let app = build_router(AppState::new(service)).layer(CorsLayer::permissive());

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AppError::from)?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::from)?;

    info!("Draining pending notifications");
    dispatcher_handle.shutdown().await;
    telemetry.shutdown();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
