use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::db::repository::AnnotationRepository;
use crate::db::Database;
use crate::llm::{prompts, LmStudioClient};
use crate::models::{Annotation, Chunk};

/// Structured per-chunk analysis with retry and version stamping. The
/// annotation ID is deterministic in (chunk, model, prompt, prompt version),
/// so re-running the same configuration is a no-op.
pub struct Annotator {
    lm: Arc<LmStudioClient>,
    db: Database,
    pipeline_version: String,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotationJson {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    sentiment: SentimentJson,
    #[serde(default)]
    entities: Vec<serde_json::Value>,
    #[serde(default)]
    claims: Vec<serde_json::Value>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    quality_flags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SentimentJson {
    #[serde(default)]
    label: String,
    #[serde(default)]
    confidence: f64,
}

fn compute_annotation_id(chunk_id: &str, model: &str) -> String {
    let digest = Sha256::digest(
        format!(
            "{chunk_id}:{model}:{}:{}",
            prompts::ANNOTATION_PROMPT_ID,
            prompts::ANNOTATION_PROMPT_VERSION
        )
        .as_bytes(),
    );
    hex::encode(digest)[..32].to_string()
}

impl Annotator {
    pub fn new(lm: Arc<LmStudioClient>, db: Database, pipeline_version: String) -> Self {
        Self {
            lm,
            db,
            pipeline_version,
            model: None,
        }
    }

    /// Annotate one chunk, retrying request failures with 5 s x attempt
    /// backoff. Returns None when the chunk could not be annotated.
    pub async fn annotate_chunk(&mut self, chunk: &Chunk, max_retries: u32) -> Option<Annotation> {
        if self.model.is_none() {
            self.model = self.lm.chat_model().await;
        }
        let Some(model) = self.model.clone() else {
            tracing::error!("No chat model available for annotation");
            return None;
        };

        let mut parsed = AnnotationJson::default();
        for attempt in 0..max_retries {
            let outcome = match self
                .lm
                .annotate_chunk(&chunk.chunk_text, prompts::ANNOTATION_PROMPT, Some(&model))
                .await
            {
                Ok(response) => serde_json::from_str::<AnnotationJson>(&response)
                    .map_err(|e| format!("parse annotation JSON: {e}")),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(value) => {
                    parsed = value;
                    break;
                }
                Err(e) => {
                    let wait = Duration::from_secs(5 * (attempt as u64 + 1));
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = max_retries,
                        chunk = %chunk.id,
                        error = %e,
                        wait_secs = wait.as_secs(),
                        "Annotation attempt failed"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        if parsed.summary.is_empty() && parsed.topics.is_empty() {
            tracing::error!(chunk = %chunk.id, "Annotation failed after retries");
            return None;
        }

        let sentiment_label = (!parsed.sentiment.label.is_empty()).then(|| parsed.sentiment.label.clone());
        let sentiment_confidence = sentiment_label.is_some().then_some(parsed.sentiment.confidence);
        let summary = (!parsed.summary.is_empty()).then(|| parsed.summary.clone());

        Some(Annotation {
            id: compute_annotation_id(&chunk.id, &model),
            chunk_id: chunk.id.clone(),
            model_id: model,
            prompt_id: prompts::ANNOTATION_PROMPT_ID.to_string(),
            prompt_version: prompts::ANNOTATION_PROMPT_VERSION.to_string(),
            pipeline_version: self.pipeline_version.clone(),
            topics_json: serde_json::to_string(&parsed.topics).ok(),
            sentiment_label,
            sentiment_confidence,
            entities_json: serde_json::to_string(&parsed.entities).ok(),
            claims_json: serde_json::to_string(&parsed.claims).ok(),
            summary,
            quality_flags_json: serde_json::to_string(&parsed.quality_flags).ok(),
            is_current: true,
            created_at: Utc::now(),
        })
    }

    /// Annotate chunks in sequence, skipping chunks already annotated by the
    /// current model and ceding the inference server between requests.
    /// Returns the count of annotations written.
    pub async fn annotate_chunks(&mut self, chunks: &[Chunk]) -> usize {
        let conn = match self.db.connect() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Annotator could not open connection");
                return 0;
            }
        };

        let mut count = 0usize;
        for chunk in chunks {
            if let Ok(Some(existing)) = AnnotationRepository::current_for_chunk(&conn, &chunk.id).await
            {
                if self.model.as_deref() == Some(existing.model_id.as_str()) {
                    continue;
                }
            }

            if let Some(annotation) = self.annotate_chunk(chunk, 3).await {
                match AnnotationRepository::insert(&conn, &annotation).await {
                    Ok(()) => {
                        count += 1;
                        tracing::debug!(chunk = %chunk.id, "Annotated chunk");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to insert annotation");
                        continue;
                    }
                }
            }
            // Brief pause so the local model can serve other consumers.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_id_deterministic_in_configuration() {
        let a = compute_annotation_id("chunk1", "model-a");
        assert_eq!(a, compute_annotation_id("chunk1", "model-a"));
        assert_eq!(a.len(), 32);
        assert_ne!(a, compute_annotation_id("chunk1", "model-b"));
        assert_ne!(a, compute_annotation_id("chunk2", "model-a"));
    }

    #[test]
    fn test_annotation_json_tolerates_missing_fields() {
        let parsed: AnnotationJson = serde_json::from_str(r#"{"summary":"s"}"#).unwrap();
        assert_eq!(parsed.summary, "s");
        assert!(parsed.topics.is_empty());
        assert!(parsed.sentiment.label.is_empty());
    }

    #[test]
    fn test_annotation_json_full_shape() {
        let raw = r#"{
            "topics": ["t"],
            "sentiment": {"label": "neutral", "confidence": 0.5},
            "entities": [{"name": "Rust", "type": "concept"}],
            "claims": [{"claim": "c", "confidence": 0.9}],
            "summary": "s",
            "quality_flags": ["technical"]
        }"#;
        let parsed: AnnotationJson = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.topics, vec!["t"]);
        assert_eq!(parsed.sentiment.label, "neutral");
        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.quality_flags, vec!["technical"]);
    }
}
