//! # Configuration Endpoints
//!
//! Read and update the gateway's runtime configuration. Updates are partial:
//! the request body only needs the fields being changed, and the merged
//! result is validated before it replaces the active config.

use crate::{error::{AppError, AppResult}, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn config_as_json(config: &crate::config::AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "audio": {
            "default_sample_rate": config.audio.default_sample_rate,
            "chunk_duration_ms": config.audio.chunk_duration_ms
        },
        "engine": {
            "backend": config.engine.backend,
            "model_path": config.engine.model_path,
            "device": config.engine.device,
            "max_sentence_silence": config.engine.max_sentence_silence,
            "enable_punctuation_model": config.engine.enable_punctuation_model,
            "default_response_mode": config.engine.default_response_mode
        },
        "performance": {
            "max_concurrent_sessions": config.performance.max_concurrent_sessions
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_as_json(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_as_json(&current_config)
    })))
}
