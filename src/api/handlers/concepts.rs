use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::db::repository::{
    AnnotationRepository, AssetRepository, ChunkRepository, ConceptRepository, EdgeRepository,
};
use crate::error::{RefineryError, Result};

use super::truncate;

const MEMBER_PREVIEW_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct ListConceptsQuery {
    pub level: Option<i64>,
}

/// `GET /concepts/list?level=`
pub async fn list_concepts(
    State(state): State<AppState>,
    Query(query): Query<ListConceptsQuery>,
) -> Result<Json<Vec<Value>>> {
    let conn = state.db.connect()?;
    let concepts = ConceptRepository::list(&conn, query.level).await?;

    Ok(Json(
        concepts
            .into_iter()
            .map(|c| {
                let exemplars = c
                    .exemplar_chunk_ids
                    .as_deref()
                    .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                    .unwrap_or_else(|| json!([]));
                json!({
                    "id": c.id,
                    "level": c.level,
                    "label": c.label,
                    "description": c.description,
                    "parent_id": c.parent_id,
                    "exemplar_chunk_ids": exemplars,
                    "model_id": c.model_id,
                    "created_at": c.created_at.to_rfc3339(),
                })
            })
            .collect(),
    ))
}

/// `GET /concepts/{concept_id}` — concept with up to 20 truncated members.
pub async fn get_concept(
    State(state): State<AppState>,
    Path(concept_id): Path<String>,
) -> Result<Json<Value>> {
    let conn = state.db.connect()?;
    let node = ConceptRepository::get(&conn, &concept_id)
        .await?
        .ok_or_else(|| RefineryError::NotFound("Concept not found".to_string()))?;

    let member_ids = EdgeRepository::member_chunk_ids(&conn, &concept_id).await?;

    let mut members = Vec::new();
    for member_id in member_ids.iter().take(MEMBER_PREVIEW_LIMIT) {
        if let Some(chunk) = ChunkRepository::get(&conn, member_id).await? {
            let mut member = json!({
                "chunk_id": member_id,
                "text": truncate(&chunk.chunk_text, 200),
                "asset_id": chunk.asset_id,
            });
            if let Some(ann) = AnnotationRepository::current_for_chunk(&conn, member_id).await? {
                member["summary"] = json!(ann.summary);
            }
            members.push(member);
        }
    }

    Ok(Json(json!({
        "id": node.id,
        "level": node.level,
        "label": node.label,
        "description": node.description,
        "parent_id": node.parent_id,
        "member_count": member_ids.len(),
        "members": members,
    })))
}

/// `GET /concepts/{concept_id}/why` — concept + exemplar chunks + generated
/// explanation.
pub async fn concept_why(
    State(state): State<AppState>,
    Path(concept_id): Path<String>,
) -> Result<Json<Value>> {
    let conn = state.db.connect()?;
    let node = ConceptRepository::get(&conn, &concept_id)
        .await?
        .ok_or_else(|| RefineryError::NotFound("Concept not found".to_string()))?;

    let exemplar_ids: Vec<String> = node
        .exemplar_chunk_ids
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    let mut evidence = Vec::new();
    for exemplar_id in &exemplar_ids {
        let Some(chunk) = ChunkRepository::get(&conn, exemplar_id).await? else {
            continue;
        };
        let asset = AssetRepository::get(&conn, &chunk.asset_id).await?;
        let ann = AnnotationRepository::current_for_chunk(&conn, exemplar_id).await?;

        let anchor = serde_json::from_str::<Value>(&chunk.evidence_anchor).unwrap_or(json!({}));
        let topics = ann
            .as_ref()
            .and_then(|a| a.topics_json.as_deref())
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .unwrap_or_else(|| json!([]));

        let mut item = json!({
            "chunk_id": exemplar_id,
            "chunk_text": truncate(&chunk.chunk_text, 300),
            "evidence_anchor": anchor,
            "topics": topics,
        });
        if let Some(asset) = asset {
            item["asset_path"] = json!(asset.path);
            item["asset_filename"] = json!(asset.filename);
        }
        if let Some(ann) = ann {
            item["annotation_summary"] = json!(ann.summary);
        }
        evidence.push(item);
    }

    let label = node.label.as_deref().unwrap_or("unknown");
    let model = node.model_id.as_deref().unwrap_or("unknown model");
    let explanation = format!(
        "This concept '{label}' was formed by clustering {} text chunks based on embedding \
         similarity using {model}. The label was generated by analyzing representative excerpts.",
        exemplar_ids.len()
    );

    Ok(Json(json!({
        "concept_id": concept_id,
        "label": node.label,
        "description": node.description,
        "pipeline_version": node.pipeline_version,
        "model_id": node.model_id,
        "evidence": evidence,
        "explanation": explanation,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RefineQuery {
    #[serde(default)]
    pub concept_id: String,
    pub n_sub: Option<usize>,
}

/// `POST /concepts/refine?concept_id=&n_sub=`
pub async fn refine_concept(
    State(state): State<AppState>,
    Query(query): Query<RefineQuery>,
) -> Result<Json<Value>> {
    if query.concept_id.is_empty() {
        return Err(RefineryError::Validation("concept_id required".to_string()));
    }
    let n_sub = query.n_sub.filter(|&n| (2..=20).contains(&n)).unwrap_or(5);

    let conceptualizer = state.orchestrator.conceptualizer();
    let sub_concepts = conceptualizer
        .refine_concept(&query.concept_id, n_sub)
        .await?;

    Ok(Json(json!({
        "parent_concept_id": query.concept_id,
        "sub_concepts": sub_concepts
            .iter()
            .map(|sc| json!({
                "id": sc.id,
                "label": sc.label,
                "description": sc.description,
                "level": sc.level,
            }))
            .collect::<Vec<_>>(),
    })))
}
