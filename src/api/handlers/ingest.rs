use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::error::{RefineryError, Result};

#[derive(Debug, Default, Deserialize)]
pub struct StartIngestRequest {
    #[serde(default)]
    pub paths: Vec<String>,
}

/// `POST /ingest/start` — 409 while a run is active.
pub async fn start_ingest(
    State(state): State<AppState>,
    body: Option<Json<StartIngestRequest>>,
) -> Result<Json<Value>> {
    if state.orchestrator.is_running() {
        return Err(RefineryError::Conflict(
            "Pipeline is already running".to_string(),
        ));
    }

    let paths = body.map(|Json(req)| req.paths).unwrap_or_default();
    let job_id = state.orchestrator.run_pipeline(paths).await?;
    Ok(Json(json!({"job_id": job_id, "status": "started"})))
}

/// `GET /ingest/status`
pub async fn ingest_status(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(state.orchestrator.status().await?))
}
