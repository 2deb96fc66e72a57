use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::db::repository::{ConceptRepository, EdgeRepository};
use crate::db::{Database, VectorStore};
use crate::error::Result;
use crate::llm::{prompts, ChatMessage, LmStudioClient};
use crate::models::{edge_type, ConceptNode, GraphEdge};
use crate::vecmath::{dot_product, kmeans, normalize};

const EXEMPLARS_PER_CONCEPT: usize = 3;
const EXEMPLAR_EXCERPT_CHARS: usize = 500;
const KMEANS_MAX_ITER: usize = 50;
const LABEL_MAX_RETRIES: u32 = 3;

/// Builds concept clusters and the chunk similarity graph from the cached
/// embeddings.
pub struct Conceptualizer {
    db: Database,
    vectors: Arc<VectorStore>,
    lm: Arc<LmStudioClient>,
    pipeline_version: String,
}

#[derive(Debug, Deserialize)]
struct ConceptLabelJson {
    #[serde(default)]
    label: String,
    #[serde(default)]
    description: String,
}

fn compute_concept_id(level: i64, cluster_idx: usize, pipeline_version: &str) -> String {
    let digest =
        Sha256::digest(format!("concept:{level}:{cluster_idx}:{pipeline_version}").as_bytes());
    hex::encode(digest)[..32].to_string()
}

fn compute_sub_concept_id(level: i64, parent_id: &str, cluster_idx: usize) -> String {
    let digest = Sha256::digest(format!("concept:{level}:{parent_id}:{cluster_idx}").as_bytes());
    hex::encode(digest)[..32].to_string()
}

fn compute_member_edge_id(concept_id: &str, chunk_id: &str) -> String {
    let digest = Sha256::digest(format!("edge:{concept_id}:{chunk_id}").as_bytes());
    hex::encode(digest)[..32].to_string()
}

fn compute_similarity_edge_id(source_id: &str, target_id: &str) -> String {
    let digest = Sha256::digest(format!("sim:{source_id}:{target_id}").as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// Indices of the vectors closest to a centroid, ascending by squared
/// distance.
fn closest_to_centroid(vectors: &[Vec<f32>], centroid: &[f32], k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let dist: f64 = v
                .iter()
                .zip(centroid.iter())
                .map(|(&a, &b)| {
                    let diff = a as f64 - b as f64;
                    diff * diff
                })
                .sum();
            (i, dist)
        })
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(k).map(|(i, _)| i).collect()
}

impl Conceptualizer {
    pub fn new(
        db: Database,
        vectors: Arc<VectorStore>,
        lm: Arc<LmStudioClient>,
        pipeline_version: String,
    ) -> Self {
        Self {
            db,
            vectors,
            lm,
            pipeline_version,
        }
    }

    /// Cluster all cached vectors into labeled concept nodes at the given
    /// level, with one membership edge per member chunk.
    pub async fn build_concepts(
        &self,
        level: i64,
        n_clusters: Option<usize>,
    ) -> Result<Vec<ConceptNode>> {
        let (ids, vectors, texts) = self.vectors.get_all().await;
        if ids.is_empty() {
            tracing::info!("No vectors to cluster");
            return Ok(Vec::new());
        }

        let mut k = n_clusters.unwrap_or_else(|| (ids.len() / 3).clamp(2, 20));
        k = k.min(ids.len()).max(1);

        tracing::info!(chunks = ids.len(), clusters = k, level, "Clustering");
        let (labels, centroids) = kmeans(&vectors, k, KMEANS_MAX_ITER);

        let conn = self.db.connect()?;
        let chat_model = self.lm.chat_model().await;
        let mut concepts = Vec::new();

        for cluster_idx in 0..k {
            let member_indices: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, &label)| label == cluster_idx)
                .map(|(i, _)| i)
                .collect();
            if member_indices.is_empty() {
                continue;
            }

            let member_ids: Vec<&String> = member_indices.iter().map(|&i| &ids[i]).collect();
            let member_texts: Vec<String> =
                member_indices.iter().map(|&i| texts[i].clone()).collect();
            let member_vecs: Vec<Vec<f32>> =
                member_indices.iter().map(|&i| vectors[i].clone()).collect();

            let exemplar_indices = closest_to_centroid(
                &member_vecs,
                &centroids[cluster_idx],
                EXEMPLARS_PER_CONCEPT,
            );
            let exemplar_ids: Vec<String> = exemplar_indices
                .iter()
                .map(|&i| member_ids[i].clone())
                .collect();

            let (label, description) = self.label_concept(&member_texts, &exemplar_indices).await;

            let node = ConceptNode {
                id: compute_concept_id(level, cluster_idx, &self.pipeline_version),
                level,
                label: Some(label),
                description: Some(description),
                parent_id: None,
                exemplar_chunk_ids: serde_json::to_string(&exemplar_ids).ok(),
                pipeline_version: Some(self.pipeline_version.clone()),
                model_id: chat_model.clone(),
                created_at: Utc::now(),
            };
            ConceptRepository::upsert(&conn, &node).await?;

            for chunk_id in &member_ids {
                let edge = GraphEdge {
                    id: compute_member_edge_id(&node.id, chunk_id),
                    source_id: node.id.clone(),
                    target_id: (*chunk_id).clone(),
                    edge_type: edge_type::CONCEPT_MEMBER.to_string(),
                    weight: 1.0,
                    evidence_json: None,
                    pipeline_version: Some(self.pipeline_version.clone()),
                    created_at: Utc::now(),
                };
                EdgeRepository::upsert(&conn, &edge).await?;
            }

            concepts.push(node);
        }

        tracing::info!(count = concepts.len(), level, "Created concept nodes");
        Ok(concepts)
    }

    /// Label a cluster from its exemplar excerpts. Falls back to a prefix of
    /// the first exemplar when the LLM cannot produce a usable label.
    async fn label_concept(&self, texts: &[String], exemplar_indices: &[usize]) -> (String, String) {
        let exemplar_texts: Vec<String> = exemplar_indices
            .iter()
            .filter_map(|&i| texts.get(i))
            .map(|t| t.chars().take(EXEMPLAR_EXCERPT_CHARS).collect())
            .collect();
        if exemplar_texts.is_empty() {
            return (
                "Unknown".to_string(),
                "No exemplar texts available".to_string(),
            );
        }

        let prompt = prompts::concept_label_prompt(&exemplar_texts);

        for attempt in 0..LABEL_MAX_RETRIES {
            let messages = [ChatMessage::new("user", &prompt)];
            let raw = match self.lm.chat(&messages, None, 0.1, 2048).await {
                Ok(raw) => raw,
                Err(e) => {
                    let wait = Duration::from_secs(5 * (attempt as u64 + 1));
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        wait_secs = wait.as_secs(),
                        "Concept labeling failed"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            let text = crate::llm::strip_code_fences(&raw);
            match serde_json::from_str::<ConceptLabelJson>(&text) {
                Ok(mut data) => {
                    if data.label.is_empty() {
                        data.label = "Unlabeled".to_string();
                    }
                    return (data.label, data.description);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse concept label JSON");
                    break;
                }
            }
        }

        let fallback: String = exemplar_texts[0].chars().take(50).collect();
        (
            format!("Cluster: {fallback}..."),
            "Auto-generated from exemplar text".to_string(),
        )
    }

    /// k-NN similarity graph over all cached vectors: for each chunk, keep
    /// the top-k strictly positive cosine neighbors. Returns the edge count.
    pub async fn build_similarity_graph(&self, k: usize) -> Result<usize> {
        let (ids, vectors, _) = self.vectors.get_all().await;
        let n = ids.len();
        if n < 2 {
            return Ok(0);
        }
        let k = k.min(n - 1);

        tracing::info!(chunks = n, k, "Building kNN similarity graph");

        let normalized: Vec<Vec<f32>> = vectors.iter().map(|v| normalize(v)).collect();
        let conn = self.db.connect()?;
        let evidence = format!(r#"{{"method":"cosine_knn","k":{k}}}"#);
        let mut edge_count = 0usize;

        for i in 0..n {
            let mut scores: Vec<(usize, f64)> = (0..n)
                .filter(|&j| j != i)
                .filter_map(|j| {
                    let sim = dot_product(&normalized[i], &normalized[j]);
                    (sim > 0.0).then_some((j, sim))
                })
                .collect();
            scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scores.truncate(k);

            for (j, sim) in scores {
                let edge = GraphEdge {
                    id: compute_similarity_edge_id(&ids[i], &ids[j]),
                    source_id: ids[i].clone(),
                    target_id: ids[j].clone(),
                    edge_type: edge_type::SIMILARITY.to_string(),
                    weight: sim,
                    evidence_json: Some(evidence.clone()),
                    pipeline_version: Some(self.pipeline_version.clone()),
                    created_at: Utc::now(),
                };
                EdgeRepository::upsert(&conn, &edge).await?;
                edge_count += 1;
            }
        }

        tracing::info!(count = edge_count, "Created similarity edges");
        Ok(edge_count)
    }

    /// Sub-cluster a concept's members into n_sub children at level + 1.
    /// Returns empty when the concept is missing or too small to refine.
    pub async fn refine_concept(&self, concept_id: &str, n_sub: usize) -> Result<Vec<ConceptNode>> {
        let conn = self.db.connect()?;
        let Some(node) = ConceptRepository::get(&conn, concept_id).await? else {
            return Ok(Vec::new());
        };

        let member_ids = EdgeRepository::member_chunk_ids(&conn, concept_id).await?;
        if member_ids.len() < n_sub {
            return Ok(Vec::new());
        }

        let (all_ids, all_vecs, all_texts) = self.vectors.get_all().await;
        let id_set: HashSet<&str> = member_ids.iter().map(String::as_str).collect();

        let mut sub_vecs = Vec::new();
        let mut sub_texts = Vec::new();
        for (i, id) in all_ids.iter().enumerate() {
            if id_set.contains(id.as_str()) {
                sub_vecs.push(all_vecs[i].clone());
                sub_texts.push(all_texts[i].clone());
            }
        }
        if sub_vecs.len() < n_sub {
            return Ok(Vec::new());
        }

        let new_level = node.level + 1;
        let (labels, centroids) = kmeans(&sub_vecs, n_sub, KMEANS_MAX_ITER);
        let chat_model = self.lm.chat_model().await;

        let mut sub_concepts = Vec::new();
        for cluster_idx in 0..n_sub {
            let member_indices: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, &label)| label == cluster_idx)
                .map(|(i, _)| i)
                .collect();
            if member_indices.is_empty() {
                continue;
            }

            let member_texts: Vec<String> =
                member_indices.iter().map(|&i| sub_texts[i].clone()).collect();
            let member_vecs: Vec<Vec<f32>> =
                member_indices.iter().map(|&i| sub_vecs[i].clone()).collect();

            let exemplar_indices = closest_to_centroid(
                &member_vecs,
                &centroids[cluster_idx],
                EXEMPLARS_PER_CONCEPT,
            );
            let (label, description) = self.label_concept(&member_texts, &exemplar_indices).await;

            let sub_node = ConceptNode {
                id: compute_sub_concept_id(new_level, concept_id, cluster_idx),
                level: new_level,
                label: Some(label),
                description: Some(description),
                parent_id: Some(concept_id.to_string()),
                exemplar_chunk_ids: None,
                pipeline_version: Some(self.pipeline_version.clone()),
                model_id: chat_model.clone(),
                created_at: Utc::now(),
            };
            ConceptRepository::upsert(&conn, &sub_node).await?;
            sub_concepts.push(sub_node);
        }

        tracing::info!(
            parent = concept_id,
            sub_concepts = sub_concepts.len(),
            "Refined concept"
        );
        Ok(sub_concepts)
    }
}
