use libsql::params;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{RefineryError, Result};
use crate::vecmath::{dot_product, normalize};

use super::Database;

/// A chunk's embedding plus the denormalized fields needed to serve a search
/// result without further lookups.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub text: String,
    pub asset_id: String,
    pub asset_path: String,
    pub evidence_anchor: String,
    pub topics: String,
    pub atom_type: String,
    pub pipeline_version: String,
}

/// A vector record with its cosine distance to the query (lower = closer).
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub record: VectorRecord,
    #[serde(rename = "_distance")]
    pub distance: f64,
}

struct CachedVec {
    normalized: Vec<f32>,
    record: VectorRecord,
}

struct CacheState {
    dimension: usize,
    cache: Vec<CachedVec>,
}

/// Persisted embeddings plus an in-memory pre-normalized mirror used for
/// brute-force cosine search. Cache and rows are mutated under the same
/// write lock and never observed diverging.
pub struct VectorStore {
    db: Database,
    state: RwLock<CacheState>,
}

impl VectorStore {
    pub fn new(db: Database, dimension: usize) -> Self {
        Self {
            db,
            state: RwLock::new(CacheState {
                dimension,
                cache: Vec::new(),
            }),
        }
    }

    pub async fn set_dimension(&self, dimension: usize) {
        self.state.write().await.dimension = dimension;
    }

    pub async fn dimension(&self) -> usize {
        self.state.read().await.dimension
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.cache.len()
    }

    /// Populate the cache from persisted blobs. The dimension is taken from
    /// the first loaded vector.
    pub async fn load_all(&self) -> Result<()> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, vector, text, asset_id, asset_path, evidence_anchor, \
                 topics, atom_type, pipeline_version FROM chunk_vectors",
                (),
            )
            .await?;

        let mut cache = Vec::new();
        while let Some(row) = rows.next().await? {
            let blob: Vec<u8> = row.get(1)?;
            let vector = blob_to_f32s(&blob);
            let normalized = normalize(&vector);
            let record = VectorRecord {
                id: row.get(0)?,
                vector,
                text: row.get(2)?,
                asset_id: row.get(3)?,
                asset_path: row.get(4)?,
                evidence_anchor: row.get::<Option<String>>(5)?.unwrap_or_default(),
                topics: row.get::<Option<String>>(6)?.unwrap_or_default(),
                atom_type: row.get::<Option<String>>(7)?.unwrap_or_default(),
                pipeline_version: row.get::<Option<String>>(8)?.unwrap_or_default(),
            };
            cache.push(CachedVec { normalized, record });
        }

        let mut state = self.state.write().await;
        if let Some(first) = cache.first() {
            state.dimension = first.normalized.len();
        }
        state.cache = cache;
        Ok(())
    }

    /// Persist records and append their normalized vectors to the cache.
    /// The vector dimension is fixed by the first insert; mismatching
    /// vectors are rejected before anything is written.
    pub async fn add_vectors(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;

        let dimension = if state.dimension == 0 {
            records[0].vector.len()
        } else {
            state.dimension
        };
        for record in &records {
            if record.vector.len() != dimension {
                return Err(RefineryError::Validation(format!(
                    "vector dimension mismatch: expected {dimension}, got {}",
                    record.vector.len()
                )));
            }
        }
        state.dimension = dimension;

        let conn = self.db.connect()?;
        let tx = conn.transaction().await?;
        for record in &records {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO chunk_vectors
                (id, vector, text, asset_id, asset_path, evidence_anchor,
                 topics, atom_type, pipeline_version)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    record.id.clone(),
                    f32s_to_blob(&record.vector),
                    record.text.clone(),
                    record.asset_id.clone(),
                    record.asset_path.clone(),
                    record.evidence_anchor.clone(),
                    record.topics.clone(),
                    record.atom_type.clone(),
                    record.pipeline_version.clone(),
                ],
            )
            .await?;
        }
        tx.commit().await?;

        for record in records {
            let normalized = normalize(&record.vector);
            state.cache.push(CachedVec { normalized, record });
        }
        Ok(())
    }

    /// Remove persisted rows and cache entries for an asset in one pass.
    pub async fn delete_by_asset(&self, asset_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let conn = self.db.connect()?;
        conn.execute(
            "DELETE FROM chunk_vectors WHERE asset_id=?1",
            params![asset_id],
        )
        .await?;
        state.cache.retain(|cv| cv.record.asset_id != asset_id);
        Ok(())
    }

    /// Brute-force cosine k-NN. Distances are 1 − similarity and the result
    /// is sorted ascending, so lower scores are closer matches.
    pub async fn search(&self, query: &[f32], limit: usize) -> Vec<SearchResult> {
        let normalized = normalize(query);
        let state = self.state.read().await;

        let mut scored: Vec<(usize, f64)> = state
            .cache
            .iter()
            .enumerate()
            .map(|(i, cv)| (i, 1.0 - dot_product(&normalized, &cv.normalized)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(i, distance)| SearchResult {
                record: state.cache[i].record.clone(),
                distance,
            })
            .collect()
    }

    /// Snapshot of (ids, original vectors, texts) for the clustering
    /// algorithms.
    pub async fn get_all(&self) -> (Vec<String>, Vec<Vec<f32>>, Vec<String>) {
        let state = self.state.read().await;
        let mut ids = Vec::with_capacity(state.cache.len());
        let mut vectors = Vec::with_capacity(state.cache.len());
        let mut texts = Vec::with_capacity(state.cache.len());
        for cv in &state.cache {
            ids.push(cv.record.id.clone());
            vectors.push(cv.record.vector.clone());
            texts.push(cv.record.text.clone());
        }
        (ids, vectors, texts)
    }
}

/// Little-endian IEEE-754 encoding; round-tripping preserves every bit.
pub fn f32s_to_blob(v: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(v.len() * 4);
    for f in v {
        buf.extend_from_slice(&f.to_le_bytes());
    }
    buf
}

pub fn blob_to_f32s(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
