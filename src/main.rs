//! # IVR Backend - Main Application Entry Point
//!
//! HTTP service that turns an uploaded audio file into a dialogue-engine
//! action: upload → WAV normalization → Whisper transcription → webhook
//! dispatch. The Whisper model is loaded once here, before the server
//! starts, and shared with every request handler.
//!
//! ## Application layout:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared state and request metrics
//! - **scratch**: request-local temp files with guaranteed cleanup
//! - **audio**: decoding and WAV normalization
//! - **transcription**: the Whisper engine and its service trait
//! - **dialogue**: the webhook client
//! - **handlers**: HTTP endpoints
//! - **error**: pipeline error taxonomy and HTTP mapping

mod audio;
mod config;
mod device;
mod dialogue;
mod error;
mod handlers;
mod health;
mod middleware;
mod scratch;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use dialogue::DialogueClient;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{ModelSize, SpeechToText, TranscriptionEngine};

/// Set by the signal handler task; polled for graceful shutdown.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting ivr-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // The scratch directory is external setup; refuse to start without it
    let scratch_dir = std::path::Path::new(&config.pipeline.scratch_dir);
    if !scratch_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Scratch directory '{}' does not exist; create it before starting the server",
            config.pipeline.scratch_dir
        ));
    }

    // Load the speech model once, before serving begins
    let model_size: ModelSize = config
        .models
        .whisper_model
        .parse()
        .context("Invalid models.whisper_model in configuration")?;
    let device = device::select_device(&config.models.device);

    let engine = TranscriptionEngine::load(
        model_size,
        device,
        config.pipeline.language.clone(),
    )
    .await
    .context("Failed to load the Whisper model")?;
    let transcriber: Arc<dyn SpeechToText> = Arc::new(engine);

    let dialogue_client = DialogueClient::new(
        config.dialogue.webhook_url.clone(),
        config.dialogue.sender.clone(),
    );

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        // The browser frontend is served from another origin; allow
        // everything, credentials included
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::from(transcriber.clone()))
            .app_data(web::Data::new(dialogue_client.clone()))
            .wrap(cors)
            .wrap(middleware::RequestTracking)
            .route("/process-audio/", web::post().to(handlers::process_audio))
            .route("/health", web::get().to(health::health_check))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
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

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ivr_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the shutdown flag.
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

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
