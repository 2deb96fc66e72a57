use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::db::repository::AnnotationRepository;
use crate::error::{RefineryError, Result};

const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_QUICK_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub filter_asset_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: String,
    pub score: f64,
    pub text: String,
    pub asset_id: String,
    pub asset_path: String,
    pub evidence_anchor: String,
    pub topics: Option<String>,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
    pub entities: Vec<String>,
}

async fn do_search(
    state: &AppState,
    query: &str,
    limit: usize,
    filter_asset_type: Option<&str>,
) -> Result<Vec<SearchResultItem>> {
    // An empty cache can never produce results; skip the embedding call.
    if state.vectors.count().await == 0 {
        return Ok(Vec::new());
    }

    let raw = state.lm.embed_single(query, None).await?;
    let query_vec: Vec<f32> = raw.iter().map(|&v| v as f32).collect();

    let results = state.vectors.search(&query_vec, limit).await;
    let conn = state.db.connect()?;

    let mut items = Vec::with_capacity(results.len());
    for result in results {
        if let Some(filter) = filter_asset_type {
            if !result.record.atom_type.is_empty() && result.record.atom_type != filter {
                continue;
            }
        }

        let mut item = SearchResultItem {
            chunk_id: result.record.id.clone(),
            score: result.distance,
            text: result.record.text,
            asset_id: result.record.asset_id,
            asset_path: result.record.asset_path,
            evidence_anchor: result.record.evidence_anchor,
            topics: (!result.record.topics.is_empty()).then_some(result.record.topics),
            summary: None,
            sentiment: None,
            entities: Vec::new(),
        };

        if let Some(ann) = AnnotationRepository::current_for_chunk(&conn, &item.chunk_id).await? {
            if let Some(raw_topics) = ann.topics_json.as_deref() {
                if let Ok(topics) = serde_json::from_str::<Vec<String>>(raw_topics) {
                    if !topics.is_empty() {
                        item.topics = Some(topics.join(", "));
                    }
                }
            }
            item.summary = ann.summary;
            item.sentiment = ann.sentiment_label;
            if let Some(raw_entities) = ann.entities_json.as_deref() {
                if let Ok(entities) =
                    serde_json::from_str::<Vec<serde_json::Value>>(raw_entities)
                {
                    item.entities = entities
                        .iter()
                        .filter_map(|e| e.get("name").and_then(|v| v.as_str()))
                        .map(str::to_string)
                        .collect();
                }
            }
        }

        items.push(item);
    }
    Ok(items)
}

/// `POST /search`
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<SearchResultItem>>> {
    let limit = req.limit.filter(|&l| l > 0).unwrap_or(DEFAULT_SEARCH_LIMIT);
    let items = do_search(&state, &req.query, limit, req.filter_asset_type.as_deref()).await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct QuickSearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /search/quick?q=&limit=`
pub async fn quick_search(
    State(state): State<AppState>,
    Query(query): Query<QuickSearchQuery>,
) -> Result<Json<Vec<SearchResultItem>>> {
    if query.q.is_empty() {
        return Err(RefineryError::Validation("q parameter required".to_string()));
    }
    let limit = query.limit.filter(|&l| l > 0).unwrap_or(DEFAULT_QUICK_LIMIT);
    let items = do_search(&state, &query.q, limit, None).await?;
    Ok(Json(items))
}
