use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::AppState;
use crate::db::repository::VolumeRepository;
use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub lm_studio: String,
    pub vector_count: usize,
    pub db: String,
    pub chat_model: Option<String>,
    pub embedding_model: Option<String>,
    pub data_dir: String,
    pub port: u16,
    pub watched_volumes: Vec<String>,
    pub context_length: Option<usize>,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let lm_ok = state.lm.health_check().await;

    let conn = state.db.connect()?;
    let watched_volumes = VolumeRepository::list(&conn)
        .await?
        .into_iter()
        .map(|v| v.path)
        .collect();

    let context_length = if lm_ok {
        Some(state.lm.context_length(None).await)
    } else {
        None
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        lm_studio: (if lm_ok { "connected" } else { "unavailable" }).to_string(),
        vector_count: state.vectors.count().await,
        db: "connected".to_string(),
        chat_model: state.lm.chat_model().await,
        embedding_model: state.lm.embedding_model().await,
        data_dir: state.config.data_dir.to_string_lossy().to_string(),
        port: state.config.port,
        watched_volumes,
        context_length,
    }))
}
