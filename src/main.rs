//! # ASR Gateway Backend - Main Application Entry Point
//!
//! Sets up an Actix-web server exposing the streaming transcription
//! WebSocket at `/ws` alongside the HTTP monitoring and configuration
//! surface.
//!
//! ## Application Architecture:
//! - **config**: configuration loading (TOML file + environment variables)
//! - **state**: shared application state, registry, engine, and metrics
//! - **audio**: PCM decoding and chunk framing
//! - **protocol**: wire command parsing and event formatting
//! - **session**: per-task state and the cross-connection registry
//! - **recognition**: the engine seam and its backends
//! - **websocket**: the per-connection transcription actor
//! - **health** / **handlers** / **middleware** / **error**: HTTP surface

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod protocol;
mod recognition;
mod session;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{bail, Result};
use config::AppConfig;
use recognition::stub::StubEngine;
use recognition::RecognitionEngine;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting asr-gateway-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    let engine = build_engine(&config)?;
    let app_state = AppState::new(config.clone(), engine);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::RequestTelemetry)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::config::get_config))
                    .route("/config", web::put().to(handlers::config::update_config)),
            )
            .route("/", web::get().to(service_banner))
            .route("/health", web::get().to(health::health_check))
            .route("/ws", web::get().to(websocket::transcribe_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Root banner identifying the service, mirroring the health endpoint's
/// service block without the metrics.
async fn service_banner() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "asr-gateway-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "websocket": "/ws",
        "health": "/health"
    }))
}

/// Construct the recognition backend named by the configuration.
///
/// Unknown backends fail bootstrap rather than silently falling back; a
/// gateway transcribing against the wrong engine is worse than one that
/// refuses to start.
fn build_engine(config: &AppConfig) -> Result<Arc<dyn RecognitionEngine>> {
    match config.engine.backend.as_str() {
        "stub" => {
            info!(
                model = %config.engine.model_path,
                device = %config.engine.device,
                "Using stub recognition backend"
            );
            Ok(Arc::new(StubEngine::new()))
        }
        other => bail!("Unknown recognition backend: {}", other),
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asr_gateway_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag; returns once shutdown has been requested.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
