use axum::extract::{Query, State};
use axum::Json;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::AppState;
use crate::db::repository::VolumeRepository;
use crate::error::{RefineryError, Result};
use crate::models::WatchedVolume;

#[derive(Debug, Deserialize)]
pub struct AddVolumeRequest {
    pub path: String,
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    pub id: String,
    pub path: String,
    pub label: Option<String>,
    pub added_at: String,
    pub last_scan_at: Option<String>,
}

impl From<WatchedVolume> for VolumeResponse {
    fn from(volume: WatchedVolume) -> Self {
        Self {
            id: volume.id,
            path: volume.path,
            label: volume.label,
            added_at: volume.added_at.to_rfc3339(),
            last_scan_at: volume.last_scan_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

/// `POST /volumes/add`
pub async fn add_volume(
    State(state): State<AppState>,
    Json(req): Json<AddVolumeRequest>,
) -> Result<Json<VolumeResponse>> {
    let path = std::path::absolute(&req.path)
        .map_err(|_| RefineryError::Validation(format!("Not a valid directory: {}", req.path)))?;
    if !path.is_dir() {
        return Err(RefineryError::Validation(format!(
            "Not a valid directory: {}",
            req.path
        )));
    }
    let path_str = path.to_string_lossy().to_string();

    let mut id_bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut id_bytes);

    let label = req.label.or_else(|| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
    });

    let volume = WatchedVolume::new(hex::encode(id_bytes), path_str.clone(), label);
    let conn = state.db.connect()?;
    VolumeRepository::add(&conn, &volume).await?;

    // Re-adding an existing path keeps the original row.
    let stored = VolumeRepository::get_by_path(&conn, &path_str)
        .await?
        .unwrap_or(volume);
    Ok(Json(stored.into()))
}

/// `GET /volumes/list`
pub async fn list_volumes(State(state): State<AppState>) -> Result<Json<Vec<VolumeResponse>>> {
    let conn = state.db.connect()?;
    let volumes = VolumeRepository::list(&conn).await?;
    Ok(Json(volumes.into_iter().map(Into::into).collect()))
}

#[derive(Debug, Deserialize)]
pub struct RemoveVolumeQuery {
    #[serde(default)]
    pub path: String,
}

/// `DELETE /volumes/remove?path=`
pub async fn remove_volume(
    State(state): State<AppState>,
    Query(query): Query<RemoveVolumeQuery>,
) -> Result<Json<Value>> {
    let path = std::path::absolute(&query.path)
        .map_err(|_| RefineryError::Validation(format!("Invalid path: {}", query.path)))?;
    let path_str = path.to_string_lossy().to_string();
    let conn = state.db.connect()?;
    VolumeRepository::remove(&conn, &path_str).await?;
    Ok(Json(json!({"status": "removed", "path": path_str})))
}
