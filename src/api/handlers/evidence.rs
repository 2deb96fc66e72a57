use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::db::repository::{AnnotationRepository, AssetRepository, ChunkRepository};
use crate::error::{RefineryError, Result};

#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    pub asset_id: String,
    pub path: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_anchor: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_text: Option<String>,
}

/// `GET /evidence/{asset_id}`
pub async fn asset_evidence(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
) -> Result<Json<EvidenceResponse>> {
    let conn = state.db.connect()?;
    let asset = AssetRepository::get(&conn, &asset_id)
        .await?
        .ok_or_else(|| RefineryError::NotFound(format!("Asset not found: {asset_id}")))?;

    let exists = std::path::Path::new(&asset.path).exists();
    Ok(Json(EvidenceResponse {
        asset_id: asset.id,
        path: asset.path,
        filename: asset.filename,
        mime_type: asset.mime_type,
        size_bytes: asset.size_bytes,
        exists,
        evidence_anchor: None,
        chunk_text: None,
    }))
}

/// `GET /evidence/chunk/{chunk_id}`
pub async fn chunk_evidence(
    State(state): State<AppState>,
    Path(chunk_id): Path<String>,
) -> Result<Json<EvidenceResponse>> {
    let conn = state.db.connect()?;
    let chunk = ChunkRepository::get(&conn, &chunk_id)
        .await?
        .ok_or_else(|| RefineryError::NotFound(format!("Chunk not found: {chunk_id}")))?;
    let asset = AssetRepository::get(&conn, &chunk.asset_id)
        .await?
        .ok_or_else(|| {
            RefineryError::NotFound(format!("Asset not found for chunk: {chunk_id}"))
        })?;

    let anchor = serde_json::from_str::<Value>(&chunk.evidence_anchor).unwrap_or(json!({}));
    let exists = std::path::Path::new(&asset.path).exists();
    Ok(Json(EvidenceResponse {
        asset_id: asset.id,
        path: asset.path,
        filename: asset.filename,
        mime_type: asset.mime_type,
        size_bytes: asset.size_bytes,
        exists,
        evidence_anchor: Some(anchor),
        chunk_text: Some(chunk.chunk_text),
    }))
}

/// `GET /evidence/chunk/{chunk_id}/annotation`
pub async fn chunk_annotation(
    State(state): State<AppState>,
    Path(chunk_id): Path<String>,
) -> Result<Json<Value>> {
    let conn = state.db.connect()?;
    let ann = AnnotationRepository::current_for_chunk(&conn, &chunk_id)
        .await?
        .ok_or_else(|| RefineryError::NotFound(format!("No annotation for chunk: {chunk_id}")))?;

    let parse_array = |raw: Option<&str>| -> Value {
        raw.and_then(|s| serde_json::from_str::<Value>(s).ok())
            .unwrap_or_else(|| json!([]))
    };

    Ok(Json(json!({
        "chunk_id": ann.chunk_id,
        "model_id": ann.model_id,
        "prompt_id": ann.prompt_id,
        "prompt_version": ann.prompt_version,
        "topics": parse_array(ann.topics_json.as_deref()),
        "sentiment": {
            "label": ann.sentiment_label,
            "confidence": ann.sentiment_confidence,
        },
        "entities": parse_array(ann.entities_json.as_deref()),
        "claims": parse_array(ann.claims_json.as_deref()),
        "summary": ann.summary,
        "quality_flags": parse_array(ann.quality_flags_json.as_deref()),
        "created_at": ann.created_at.to_rfc3339(),
    })))
}

/// `GET /evidence/assets/all`
pub async fn all_assets(State(state): State<AppState>) -> Result<Json<Vec<Value>>> {
    let conn = state.db.connect()?;
    let assets = AssetRepository::list_all(&conn).await?;
    Ok(Json(
        assets
            .into_iter()
            .map(|a| {
                json!({
                    "id": a.id,
                    "path": a.path,
                    "filename": a.filename,
                    "mime_type": a.mime_type,
                    "size_bytes": a.size_bytes,
                    "status": a.status.as_str(),
                })
            })
            .collect(),
    ))
}
