use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use rand::RngCore;
use serde_json::{json, Value};

use crate::config::Config;
use crate::db::repository::{
    AnnotationRepository, AssetRepository, AtomRepository, ChunkRepository, ConceptRepository,
    EdgeRepository, JobRepository, VolumeRepository,
};
use crate::db::{Database, VectorStore};
use crate::error::{RefineryError, Result};
use crate::llm::LmStudioClient;
use crate::models::{AssetStatus, JobStatus, PipelineJob};

use super::{Annotator, Chunker, Conceptualizer, Embedder, Registry, ScanStats, Scanner};

const JOB_TYPE_FULL_INGEST: &str = "full_ingest";
const STAGE_BATCH_LIMIT: i64 = 10_000;
const ACTIVITY_LOG_CAPACITY: usize = 200;
const ACTIVITY_LOG_EXPOSED: usize = 50;
const SIMILARITY_GRAPH_K: usize = 5;

#[derive(Default)]
struct RunState {
    running: bool,
    current_job_id: Option<String>,
}

/// Clears the running flag on every worker exit path, panics included.
struct RunGuard {
    run: Arc<Mutex<RunState>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.run.lock() {
            state.running = false;
            state.current_job_id = None;
        }
    }
}

fn generate_job_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Drives one pipeline run through its six sequential stages, tracking live
/// progress for the UI and persisting job state for crash recovery. At most
/// one run is active per daemon instance.
pub struct Orchestrator {
    db: Database,
    vectors: Arc<VectorStore>,
    lm: Arc<LmStudioClient>,
    config: Arc<Config>,
    run: Arc<Mutex<RunState>>,
    live: Arc<RwLock<Value>>,
    activity: Arc<Mutex<VecDeque<Value>>>,
}

impl Clone for Orchestrator {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            vectors: Arc::clone(&self.vectors),
            lm: Arc::clone(&self.lm),
            config: Arc::clone(&self.config),
            run: Arc::clone(&self.run),
            live: Arc::clone(&self.live),
            activity: Arc::clone(&self.activity),
        }
    }
}

impl Orchestrator {
    pub fn new(
        db: Database,
        vectors: Arc<VectorStore>,
        lm: Arc<LmStudioClient>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            vectors,
            lm,
            config,
            run: Arc::new(Mutex::new(RunState::default())),
            live: Arc::new(RwLock::new(json!({}))),
            activity: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().map(|state| state.running).unwrap_or(false)
    }

    pub fn conceptualizer(&self) -> Conceptualizer {
        Conceptualizer::new(
            self.db.clone(),
            Arc::clone(&self.vectors),
            Arc::clone(&self.lm),
            self.config.pipeline.version.clone(),
        )
    }

    /// Replace the single-key live progress map.
    fn set_live(&self, value: Value) {
        if let Ok(mut live) = self.live.write() {
            *live = value;
        }
    }

    /// Append an activity entry, keeping the ring capped at 200.
    fn emit(&self, stage: &str, action: &str, detail: &str, counts: Option<Value>) {
        let mut entry = json!({
            "ts": Utc::now().format("%H:%M:%S").to_string(),
            "stage": stage,
            "action": action,
            "detail": detail,
        });
        if let Some(counts) = counts {
            entry["counts"] = counts;
        }
        if let Ok(mut log) = self.activity.lock() {
            log.push_back(entry);
            while log.len() > ACTIVITY_LOG_CAPACITY {
                log.pop_front();
            }
        }
    }

    /// Start a pipeline run in a background worker. Fails with a conflict
    /// while another run is active. Returns the new job ID.
    pub async fn run_pipeline(&self, volume_paths: Vec<String>) -> Result<String> {
        {
            let mut state = self
                .run
                .lock()
                .map_err(|_| RefineryError::Internal("run state poisoned".to_string()))?;
            if state.running {
                return Err(RefineryError::Conflict(
                    "pipeline already running".to_string(),
                ));
            }
            state.running = true;
        }

        let job_id = generate_job_id();
        if let Ok(mut state) = self.run.lock() {
            state.current_job_id = Some(job_id.clone());
        }

        let mut job = PipelineJob::new(job_id.clone(), JOB_TYPE_FULL_INGEST.to_string());
        job.status = JobStatus::Running;
        job.progress_json = Some(
            json!({"stage": "starting", "started_at": Utc::now().to_rfc3339()}).to_string(),
        );

        let conn = self.db.connect()?;
        JobRepository::upsert(&conn, &job).await?;

        let worker = self.clone();
        let worker_job_id = job_id.clone();
        tokio::spawn(async move {
            worker.run_worker(worker_job_id, volume_paths).await;
        });

        Ok(job_id)
    }

    async fn run_worker(self, job_id: String, volume_paths: Vec<String>) {
        let _guard = RunGuard {
            run: Arc::clone(&self.run),
        };

        self.set_live(json!({}));
        if let Ok(mut log) = self.activity.lock() {
            log.clear();
        }

        match self.run_stages(&job_id, volume_paths).await {
            Ok(()) => {
                self.emit("completed", "done", "Pipeline finished", None);
                tracing::info!("=== Pipeline completed ===");
            }
            Err(e) => {
                tracing::error!(job = %job_id, error = %e, "Pipeline run failed");
                let progress =
                    json!({"stage": "failed", "error": e.to_string()}).to_string();
                if let Ok(conn) = self.db.connect() {
                    let _ = JobRepository::update_status(
                        &conn,
                        &job_id,
                        JobStatus::Failed,
                        Some(&progress),
                    )
                    .await;
                }
                self.emit("failed", "error", &e.to_string(), None);
            }
        }
        self.set_live(json!({}));
    }

    async fn run_stages(&self, job_id: &str, mut volume_paths: Vec<String>) -> Result<()> {
        let conn = self.db.connect()?;
        let mut progress = json!({"stage": "scanning", "stages": {}});

        // Chunk sizes adapt to the model context before anything runs.
        let mut chunker = Chunker::new(&self.config.pipeline);
        let context_length = self.lm.context_length(None).await;
        chunker.adapt_to_context(context_length);
        tracing::info!(tokens = context_length, "LLM context window");

        // Stage 1: Scan
        tracing::info!("=== Stage 1: Scanning ===");
        self.update_progress(&conn, job_id, &progress).await?;

        let mut scanned_volume_ids = Vec::new();
        if volume_paths.is_empty() {
            for volume in VolumeRepository::list(&conn).await? {
                volume_paths.push(volume.path.clone());
                scanned_volume_ids.push(volume.id);
            }
        }

        let scanner = Scanner::new(self.db.clone(), self.config.pipeline.max_file_size_bytes);
        let mut scan_stats = ScanStats::default();
        let total_paths = volume_paths.len();
        for (i, path) in volume_paths.iter().enumerate() {
            self.set_live(json!({"scan": {
                "current_path": path, "done": i, "total": total_paths,
            }}));
            match scanner.scan_directory(Path::new(path)).await {
                Ok(stats) => scan_stats.add(stats),
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Scan error");
                    scan_stats.errors += 1;
                    continue;
                }
            }
            let base = Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.clone());
            self.emit("scanning", "scanned", &base, serde_json::to_value(scan_stats).ok());
        }
        for volume_id in &scanned_volume_ids {
            VolumeRepository::touch_scan_time(&conn, volume_id).await?;
        }
        progress["stages"]["scan"] = serde_json::to_value(scan_stats)?;
        tracing::info!(stats = ?scan_stats, "Scan complete");

        // Stage 2: Extract
        tracing::info!("=== Stage 2: Extracting ===");
        progress["stage"] = json!("extracting");
        self.update_progress(&conn, job_id, &progress).await?;

        let registry = Registry::with_defaults();
        let pending =
            AssetRepository::list_by_status(&conn, AssetStatus::Pending, STAGE_BATCH_LIMIT).await?;
        let mut extract_count = 0usize;
        let mut extract_errors = 0usize;

        for (i, asset) in pending.iter().enumerate() {
            self.set_live(json!({"extract": {
                "current_file": asset.filename, "done": i, "total": pending.len(),
            }}));

            // Re-extraction invalidates everything downstream of the asset.
            AtomRepository::delete_for_asset(&conn, &asset.id).await?;
            ChunkRepository::delete_for_asset(&conn, &asset.id).await?;
            self.vectors.delete_by_asset(&asset.id).await?;

            match registry.extract(asset) {
                Ok(atoms) => {
                    if !atoms.is_empty() {
                        AtomRepository::insert_batch(&conn, &atoms).await?;
                    }
                    AssetRepository::update_status(&conn, &asset.id, AssetStatus::Extracted, None)
                        .await?;
                    extract_count += 1;
                    self.emit(
                        "extracting",
                        "extracted",
                        &asset.filename,
                        Some(json!({"done": i + 1, "total": pending.len()})),
                    );
                }
                Err(failure) => {
                    tracing::error!(file = %asset.filename, error = %failure.error, "Extract error");
                    if !failure.partial_atoms.is_empty() {
                        AtomRepository::insert_batch(&conn, &failure.partial_atoms).await?;
                    }
                    AssetRepository::update_status(
                        &conn,
                        &asset.id,
                        AssetStatus::Error,
                        Some(&failure.error.to_string()),
                    )
                    .await?;
                    extract_errors += 1;
                }
            }
        }
        progress["stages"]["extract"] =
            json!({"processed": extract_count, "errors": extract_errors});
        tracing::info!(count = extract_count, errors = extract_errors, "Extract complete");

        // Stage 3: Chunk
        tracing::info!("=== Stage 3: Chunking ===");
        progress["stage"] = json!("chunking");
        self.update_progress(&conn, job_id, &progress).await?;

        let extracted =
            AssetRepository::list_by_status(&conn, AssetStatus::Extracted, STAGE_BATCH_LIMIT)
                .await?;
        let mut chunk_count = 0usize;

        for (i, asset) in extracted.iter().enumerate() {
            self.set_live(json!({"chunk": {
                "current_file": asset.filename, "done": i, "total": extracted.len(),
                "chunks_created": chunk_count,
            }}));

            let atoms = AtomRepository::list_for_asset(&conn, &asset.id).await?;
            let chunks = chunker.chunk_atoms(&atoms, &asset.id);
            if !chunks.is_empty() {
                ChunkRepository::insert_batch(&conn, &chunks).await?;
                chunk_count += chunks.len();
            }
            AssetRepository::update_status(&conn, &asset.id, AssetStatus::Chunked, None).await?;
            self.emit(
                "chunking",
                "chunked",
                &asset.filename,
                Some(json!({
                    "done": i + 1, "total": extracted.len(), "chunks_created": chunk_count,
                })),
            );
        }
        progress["stages"]["chunk"] = json!({"chunks_created": chunk_count});
        tracing::info!(chunks = chunk_count, "Chunk complete");

        // Stage 4: Embed
        tracing::info!("=== Stage 4: Embedding ===");
        progress["stage"] = json!("embedding");
        self.update_progress(&conn, job_id, &progress).await?;

        let unembedded = ChunkRepository::list_without_embeddings(&conn, STAGE_BATCH_LIMIT).await?;
        if unembedded.is_empty() {
            progress["stages"]["embed"] =
                json!({"embedded": 0, "note": "all chunks already embedded"});
        } else {
            self.set_live(json!({"embed": {"embedded": 0, "total": unembedded.len()}}));
            self.emit(
                "embedding",
                "started",
                &format!("{} chunks to embed", unembedded.len()),
                None,
            );

            let mut embedder = Embedder::new(
                Arc::clone(&self.lm),
                Arc::clone(&self.vectors),
                self.db.clone(),
                self.config.lm_studio.embedding_batch_size,
            );
            let embedded_count = embedder.embed_chunks(&unembedded).await;

            self.set_live(json!({"embed": {
                "embedded": embedded_count, "total": unembedded.len(),
            }}));
            self.emit(
                "embedding",
                "embedded",
                &format!("{embedded_count} chunks"),
                Some(json!({"embedded": embedded_count, "total": unembedded.len()})),
            );
            progress["stages"]["embed"] = json!({"embedded": embedded_count});
            tracing::info!(count = embedded_count, "Embed complete");

            // Promote assets whose chunks are now all embedded.
            let chunked =
                AssetRepository::list_by_status(&conn, AssetStatus::Chunked, STAGE_BATCH_LIMIT)
                    .await?;
            for asset in chunked {
                let chunks = ChunkRepository::list_for_asset(&conn, &asset.id).await?;
                if chunks.iter().all(|c| c.embedding_id.is_some()) {
                    AssetRepository::update_status(&conn, &asset.id, AssetStatus::Embedded, None)
                        .await?;
                }
            }
        }

        // Stage 5: Annotate
        tracing::info!("=== Stage 5: Annotating ===");
        progress["stage"] = json!("annotating");
        self.update_progress(&conn, job_id, &progress).await?;

        let embedded_assets =
            AssetRepository::list_by_status(&conn, AssetStatus::Embedded, STAGE_BATCH_LIMIT)
                .await?;
        let mut annotator = Annotator::new(
            Arc::clone(&self.lm),
            self.db.clone(),
            self.config.pipeline.version.clone(),
        );
        let mut annotate_count = 0usize;

        for (i, asset) in embedded_assets.iter().enumerate() {
            self.set_live(json!({"annotate": {
                "current_file": asset.filename, "done": i, "total": embedded_assets.len(),
                "annotated_chunks": annotate_count,
            }}));

            let chunks = ChunkRepository::list_for_asset(&conn, &asset.id).await?;
            let count = annotator.annotate_chunks(&chunks).await;
            annotate_count += count;
            if count > 0 {
                AssetRepository::update_status(&conn, &asset.id, AssetStatus::Annotated, None)
                    .await?;
            }
            self.emit(
                "annotating",
                "annotated",
                &asset.filename,
                Some(json!({
                    "done": i + 1, "total": embedded_assets.len(),
                    "annotated_chunks": annotate_count,
                })),
            );
        }
        progress["stages"]["annotate"] = json!({"annotated": annotate_count});
        tracing::info!(count = annotate_count, "Annotate complete");

        // Stage 6: Conceptualize
        tracing::info!("=== Stage 6: Conceptualizing ===");
        progress["stage"] = json!("conceptualizing");
        self.update_progress(&conn, job_id, &progress).await?;
        self.set_live(json!({"conceptualize": {"status": "building concepts"}}));
        self.emit("conceptualizing", "started", "building concept clusters", None);

        let conceptualizer = self.conceptualizer();
        let concepts = match conceptualizer.build_concepts(0, None).await {
            Ok(concepts) => concepts,
            Err(e) => {
                tracing::error!(error = %e, "Concept building failed");
                Vec::new()
            }
        };
        self.emit(
            "conceptualizing",
            "concepts_built",
            &format!("{} concepts", concepts.len()),
            None,
        );
        self.set_live(json!({"conceptualize": {
            "status": "building graph", "concepts": concepts.len(),
        }}));

        let edge_count = match conceptualizer
            .build_similarity_graph(SIMILARITY_GRAPH_K)
            .await
        {
            Ok(edge_count) => edge_count,
            Err(e) => {
                tracing::error!(error = %e, "Similarity graph failed");
                0
            }
        };
        self.emit(
            "conceptualizing",
            "graph_built",
            &format!("{edge_count} edges"),
            None,
        );
        progress["stages"]["conceptualize"] =
            json!({"concepts": concepts.len(), "edges": edge_count});
        tracing::info!(concepts = concepts.len(), edges = edge_count, "Conceptualize complete");

        // Done
        progress["stage"] = json!("completed");
        progress["completed_at"] = json!(Utc::now().to_rfc3339());
        JobRepository::update_status(
            &conn,
            job_id,
            JobStatus::Completed,
            Some(&progress.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn update_progress(
        &self,
        conn: &libsql::Connection,
        job_id: &str,
        progress: &Value,
    ) -> Result<()> {
        JobRepository::update_status(conn, job_id, JobStatus::Running, Some(&progress.to_string()))
            .await
    }

    /// Aggregate pipeline status for `/ingest/status`: persisted counters
    /// refreshed from the store plus the in-memory live view and the most
    /// recent activity entries in chronological order.
    pub async fn status(&self) -> Result<Value> {
        let conn = self.db.connect()?;

        let counts = AssetRepository::count_by_status(&conn).await?;
        let total: i64 = counts.values().sum();

        let job_info = match JobRepository::latest(&conn, Some(JOB_TYPE_FULL_INGEST)).await? {
            Some(job) => {
                let parsed_progress = job
                    .progress_json
                    .as_deref()
                    .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
                    .unwrap_or(Value::Null);
                json!({
                    "job_id": job.id,
                    "status": job.status.as_str(),
                    "progress": parsed_progress,
                })
            }
            None => json!({}),
        };

        let recent_log: Vec<Value> = self
            .activity
            .lock()
            .map(|log| {
                let skip = log.len().saturating_sub(ACTIVITY_LOG_EXPOSED);
                log.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default();

        let chunk_count = ChunkRepository::count(&conn).await?;
        let annotation_count = AnnotationRepository::count_current(&conn).await?;
        let concept_count = ConceptRepository::count(&conn).await?;
        let edge_count = EdgeRepository::count(&conn).await?;

        let (running, current_job_id) = self
            .run
            .lock()
            .map(|state| (state.running, state.current_job_id.clone()))
            .unwrap_or((false, None));

        let live = if running {
            self.live
                .read()
                .map(|live| live.clone())
                .unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        Ok(json!({
            "running": running,
            "current_job_id": current_job_id,
            "total_assets": total,
            "status_counts": counts,
            "latest_job": job_info,
            "vector_count": self.vectors.count().await,
            "chunk_count": chunk_count,
            "annotation_count": annotation_count,
            "concept_count": concept_count,
            "edge_count": edge_count,
            "live": live,
            "activity_log": recent_log,
        }))
    }
}
