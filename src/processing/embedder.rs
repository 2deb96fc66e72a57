use std::sync::Arc;

use crate::db::repository::{AssetRepository, ChunkRepository};
use crate::db::{Database, VectorRecord, VectorStore};
use crate::llm::LmStudioClient;
use crate::models::{AtomType, Chunk};

/// Sends chunk text to the embedding model in batches and writes the vectors
/// through the store. The model and its dimension are resolved lazily on the
/// first call.
pub struct Embedder {
    lm: Arc<LmStudioClient>,
    vectors: Arc<VectorStore>,
    db: Database,
    batch_size: usize,
    model: Option<String>,
    dim_detected: bool,
}

impl Embedder {
    pub fn new(
        lm: Arc<LmStudioClient>,
        vectors: Arc<VectorStore>,
        db: Database,
        batch_size: usize,
    ) -> Self {
        Self {
            lm,
            vectors,
            db,
            batch_size: batch_size.max(1),
            model: None,
            dim_detected: false,
        }
    }

    /// Embed chunks and store their vectors. Returns the count successfully
    /// embedded; a failed batch is logged and skipped, leaving its chunks
    /// unembedded for the next run.
    pub async fn embed_chunks(&mut self, chunks: &[Chunk]) -> usize {
        if chunks.is_empty() {
            return 0;
        }

        if self.model.is_none() {
            self.model = self.lm.embedding_model().await;
        }
        let Some(model) = self.model.clone() else {
            tracing::error!("No embedding model available");
            return 0;
        };

        if !self.dim_detected {
            match self.lm.embed_single("hello world", Some(&model)).await {
                Ok(vector) => {
                    self.vectors.set_dimension(vector.len()).await;
                    self.dim_detected = true;
                    tracing::info!(dim = vector.len(), model = %model, "Detected embedding dimension");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to detect embedding dimension");
                    return 0;
                }
            }
        }

        let conn = match self.db.connect() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Embedder could not open connection");
                return 0;
            }
        };

        let mut embedded_count = 0usize;

        for (batch_idx, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.chunk_text.clone()).collect();

            let raw_vectors = match self.lm.embed(&texts, Some(&model)).await {
                Ok(vectors) => vectors,
                Err(e) => {
                    tracing::error!(error = %e, "Embedding batch failed");
                    continue;
                }
            };
            if raw_vectors.len() != batch.len() {
                tracing::error!(
                    expected = batch.len(),
                    got = raw_vectors.len(),
                    "Embedding batch returned wrong count"
                );
                continue;
            }

            let mut records = Vec::with_capacity(batch.len());
            for (chunk, raw) in batch.iter().zip(raw_vectors.iter()) {
                let vector: Vec<f32> = raw.iter().map(|&v| v as f32).collect();
                let asset_path = AssetRepository::get(&conn, &chunk.asset_id)
                    .await
                    .ok()
                    .flatten()
                    .map(|asset| asset.path)
                    .unwrap_or_default();

                records.push(VectorRecord {
                    id: chunk.id.clone(),
                    vector,
                    text: chunk.chunk_text.clone(),
                    asset_id: chunk.asset_id.clone(),
                    asset_path,
                    evidence_anchor: chunk.evidence_anchor.clone(),
                    topics: String::new(),
                    atom_type: AtomType::Text.as_str().to_string(),
                    pipeline_version: chunk.pipeline_version.clone(),
                });
            }

            if let Err(e) = self.vectors.add_vectors(records).await {
                tracing::error!(error = %e, "Failed to add vectors");
                continue;
            }

            for chunk in batch {
                if let Err(e) = ChunkRepository::update_embedding(&conn, &chunk.id, &chunk.id).await
                {
                    tracing::error!(chunk = %chunk.id, error = %e, "Failed to mark chunk embedded");
                }
            }

            embedded_count += batch.len();
            tracing::info!(batch = batch_idx + 1, count = batch.len(), "Embedded batch");
        }

        embedded_count
    }
}
