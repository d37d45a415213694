//! # Configuration Endpoints
//!
//! Read and partially update the runtime configuration. Updates are
//! validated before they replace the live config; model and device changes
//! only affect the next process start, since the engine is loaded once.

use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn config_json(config: &crate::config::AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "models": {
            "whisper_model": config.models.whisper_model,
            "device": config.models.device
        },
        "pipeline": {
            "language": config.pipeline.language,
            "scratch_dir": config.pipeline.scratch_dir,
            "max_upload_bytes": config.pipeline.max_upload_bytes
        },
        "dialogue": {
            "webhook_url": config.dialogue.webhook_url,
            "sender": config.dialogue.sender
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_json(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::BadRequest)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_json(&current_config)
    })))
}
