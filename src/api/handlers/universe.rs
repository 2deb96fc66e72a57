use std::collections::HashSet;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::db::repository::{
    AnnotationRepository, AssetRepository, ChunkRepository, ConceptRepository, EdgeOrder,
    EdgeRepository,
};
use crate::error::{RefineryError, Result};

use super::truncate;

const SNAPSHOT_EDGE_LIMIT: i64 = 500;
const FOCUS_EDGE_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub lod: Option<String>,
}

/// `GET /universe/snapshot?lod=macro|mid|near` — read-only projection of the
/// concept/chunk graph for the visualization client. Macro shows level-0
/// concepts; mid adds sub-concepts; near adds chunk nodes.
pub async fn snapshot(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<Value>> {
    let lod = query.lod.unwrap_or_else(|| "macro".to_string());
    let conn = state.db.connect()?;

    let mut nodes: Vec<Value> = Vec::new();

    let level0 = ConceptRepository::list(&conn, Some(0)).await?;
    let cluster_count = level0.len().max(1);
    for (i, concept) in level0.iter().enumerate() {
        let hue = i as f64 / cluster_count as f64 * 360.0;
        let exemplars = concept
            .exemplar_chunk_ids
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .unwrap_or_else(|| json!([]));
        nodes.push(json!({
            "id": concept.id,
            "label": concept.label.clone().unwrap_or_else(|| "Unlabeled".to_string()),
            "level": concept.level,
            "type": "concept",
            "size": 20,
            "color": format!("hsl({hue:.0}, 70%, 60%)"),
            "cluster": i,
            "description": concept.description,
            "exemplar_chunk_ids": exemplars,
        }));
    }

    if lod == "mid" || lod == "near" {
        let all_concepts = ConceptRepository::list(&conn, None).await?;
        for concept in all_concepts.iter().filter(|c| c.level != 0) {
            let parent_cluster = concept
                .parent_id
                .as_deref()
                .and_then(|pid| level0.iter().position(|pc| pc.id == pid))
                .unwrap_or(0);
            let hue = parent_cluster as f64 / cluster_count as f64 * 360.0;
            nodes.push(json!({
                "id": concept.id,
                "label": concept.label.clone().unwrap_or_else(|| "Sub-concept".to_string()),
                "level": concept.level,
                "type": "sub_concept",
                "size": 12,
                "color": format!("hsl({hue:.0}, 50%, 50%)"),
                "cluster": parent_cluster,
                "parent_id": concept.parent_id,
            }));
        }
    }

    if lod == "near" {
        for asset in AssetRepository::list_all(&conn).await? {
            for chunk in ChunkRepository::list_for_asset(&conn, &asset.id).await? {
                let ann = AnnotationRepository::current_for_chunk(&conn, &chunk.id).await?;
                let topics_label = ann
                    .as_ref()
                    .and_then(|a| a.topics_json.as_deref())
                    .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
                    .map(|topics| {
                        topics.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
                    })
                    .unwrap_or_default();
                let label = if topics_label.is_empty() {
                    format!("{}...", truncate(&chunk.chunk_text, 40))
                } else {
                    topics_label
                };

                let mut node = json!({
                    "id": chunk.id,
                    "label": label,
                    "level": 99,
                    "type": "chunk",
                    "size": 5,
                    "color": "hsl(210, 30%, 50%)",
                    "cluster": -1,
                    "asset_path": asset.path,
                });
                if let Some(ann) = ann {
                    node["summary"] = json!(ann.summary);
                }
                nodes.push(node);
            }
        }
    }

    let node_ids: HashSet<&str> = nodes
        .iter()
        .filter_map(|n| n.get("id").and_then(|v| v.as_str()))
        .collect();

    let edges: Vec<Value> = EdgeRepository::list(&conn, EdgeOrder::WeightDesc, SNAPSHOT_EDGE_LIMIT)
        .await?
        .into_iter()
        .filter(|e| node_ids.contains(e.source_id.as_str()) && node_ids.contains(e.target_id.as_str()))
        .map(|e| {
            json!({
                "source": e.source_id,
                "target": e.target_id,
                "weight": e.weight,
                "type": e.edge_type,
            })
        })
        .collect();

    Ok(Json(json!({
        "lod": lod,
        "node_count": nodes.len(),
        "edge_count": edges.len(),
        "nodes": nodes,
        "edges": edges,
    })))
}

#[derive(Debug, Deserialize)]
pub struct FocusQuery {
    #[serde(default)]
    pub node_id: String,
}

/// `POST /universe/focus?node_id=` — neighborhood graph around one node.
pub async fn focus(
    State(state): State<AppState>,
    Query(query): Query<FocusQuery>,
) -> Result<Json<Value>> {
    if query.node_id.is_empty() {
        return Err(RefineryError::Validation("node_id required".to_string()));
    }
    let conn = state.db.connect()?;

    let edge_rows = EdgeRepository::list_for_node(&conn, &query.node_id, FOCUS_EDGE_LIMIT).await?;

    let mut neighbor_ids = HashSet::new();
    let mut edges = Vec::new();
    for edge in &edge_rows {
        neighbor_ids.insert(edge.source_id.clone());
        neighbor_ids.insert(edge.target_id.clone());
        edges.push(json!({
            "source": edge.source_id,
            "target": edge.target_id,
            "weight": edge.weight,
            "type": edge.edge_type,
        }));
    }

    let mut nodes = Vec::new();
    for node_id in &neighbor_ids {
        if let Some(concept) = ConceptRepository::get(&conn, node_id).await? {
            nodes.push(json!({
                "id": concept.id,
                "label": concept.label.clone().unwrap_or_else(|| "Concept".to_string()),
                "level": concept.level,
                "type": "concept",
                "size": 15,
                "focused": concept.id == query.node_id,
            }));
        } else if let Some(chunk) = ChunkRepository::get(&conn, node_id).await? {
            let mut node = json!({
                "id": node_id,
                "label": format!("{}...", truncate(&chunk.chunk_text, 50)),
                "level": 99,
                "type": "chunk",
                "size": 5,
                "focused": *node_id == query.node_id,
            });
            if let Some(ann) = AnnotationRepository::current_for_chunk(&conn, node_id).await? {
                node["summary"] = json!(ann.summary);
            }
            nodes.push(node);
        }
    }

    Ok(Json(json!({
        "focused_node": query.node_id,
        "nodes": nodes,
        "edges": edges,
    })))
}
