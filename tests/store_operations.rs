use chrono::Utc;
use tempfile::TempDir;

use knowledge_refinery::db::repository::{
    AnnotationRepository, AssetRepository, AtomRepository, ChunkRepository, JobRepository,
    VolumeRepository,
};
use knowledge_refinery::db::{Database, VectorRecord, VectorStore};
use knowledge_refinery::models::{
    Annotation, AssetStatus, AtomType, Chunk, ContentAtom, EvidenceAnchor, FileAsset, JobStatus,
    PipelineJob, WatchedVolume,
};

async fn test_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db = Database::new(&dir.path().join("refinery.db"))
        .await
        .expect("failed to create database");
    (dir, db)
}

fn test_asset(id: &str, path: &str) -> FileAsset {
    let mut asset = FileAsset::new(id.to_string(), path.to_string(), "file.txt".to_string());
    asset.size_bytes = 42;
    asset.mtime_ns = 1_700_000_000_000_000_000;
    asset.content_hash = Some("abc123".to_string());
    asset
}

fn test_chunk(id: &str, asset_id: &str, text: &str) -> Chunk {
    Chunk::new(
        id.to_string(),
        "atom1".to_string(),
        asset_id.to_string(),
        text.to_string(),
        10,
        0,
        format!(r#"{{"asset_id":"{asset_id}"}}"#),
        "v1.0".to_string(),
    )
}

async fn seed_atom(conn: &libsql::Connection, asset_id: &str) {
    let anchor = EvidenceAnchor::for_asset(asset_id).to_json();
    let mut atom = ContentAtom::new(
        "atom1".to_string(),
        asset_id.to_string(),
        AtomType::Text,
        0,
        anchor,
    );
    atom.payload_text = Some("seed".to_string());
    AtomRepository::insert(conn, &atom).await.unwrap();
}

fn test_annotation(id: &str, chunk_id: &str, model: &str) -> Annotation {
    Annotation {
        id: id.to_string(),
        chunk_id: chunk_id.to_string(),
        model_id: model.to_string(),
        prompt_id: "annotate_chunk_v1".to_string(),
        prompt_version: "1.0".to_string(),
        pipeline_version: "v1.0".to_string(),
        topics_json: Some(r#"["t"]"#.to_string()),
        sentiment_label: Some("neutral".to_string()),
        sentiment_confidence: Some(0.5),
        entities_json: Some("[]".to_string()),
        claims_json: Some("[]".to_string()),
        summary: Some("s".to_string()),
        quality_flags_json: Some("[]".to_string()),
        is_current: true,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn asset_upsert_and_lookup() {
    let (_dir, db) = test_db().await;
    let conn = db.connect().unwrap();

    let asset = test_asset("asset1", "/tmp/corpus/file.txt");
    AssetRepository::upsert(&conn, &asset).await.unwrap();

    let by_id = AssetRepository::get(&conn, "asset1").await.unwrap().unwrap();
    assert_eq!(by_id.path, "/tmp/corpus/file.txt");
    assert_eq!(by_id.status, AssetStatus::Pending);
    assert_eq!(by_id.size_bytes, 42);

    let by_path = AssetRepository::get_by_path(&conn, "/tmp/corpus/file.txt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_path.id, "asset1");

    assert!(AssetRepository::get(&conn, "missing").await.unwrap().is_none());
}

#[tokio::test]
async fn asset_upsert_is_idempotent_on_id() {
    let (_dir, db) = test_db().await;
    let conn = db.connect().unwrap();

    let mut asset = test_asset("asset1", "/tmp/a.txt");
    AssetRepository::upsert(&conn, &asset).await.unwrap();
    asset.status = AssetStatus::Extracted;
    AssetRepository::upsert(&conn, &asset).await.unwrap();

    let all = AssetRepository::list_all(&conn).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, AssetStatus::Extracted);
}

#[tokio::test]
async fn asset_status_updates_and_counts() {
    let (_dir, db) = test_db().await;
    let conn = db.connect().unwrap();

    AssetRepository::upsert(&conn, &test_asset("a1", "/tmp/1.txt"))
        .await
        .unwrap();
    AssetRepository::upsert(&conn, &test_asset("a2", "/tmp/2.txt"))
        .await
        .unwrap();

    AssetRepository::update_status(&conn, "a1", AssetStatus::Error, Some("boom"))
        .await
        .unwrap();

    let errored = AssetRepository::get(&conn, "a1").await.unwrap().unwrap();
    assert_eq!(errored.status, AssetStatus::Error);
    assert_eq!(errored.error_message.as_deref(), Some("boom"));

    let counts = AssetRepository::count_by_status(&conn).await.unwrap();
    assert_eq!(counts.get("error"), Some(&1));
    assert_eq!(counts.get("pending"), Some(&1));

    let pending = AssetRepository::list_by_status(&conn, AssetStatus::Pending, 100)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "a2");
}

#[tokio::test]
async fn atoms_batch_insert_preserves_sequence_order() {
    let (_dir, db) = test_db().await;
    let conn = db.connect().unwrap();

    AssetRepository::upsert(&conn, &test_asset("a1", "/tmp/1.txt"))
        .await
        .unwrap();

    let anchor = EvidenceAnchor::for_asset("a1").to_json();
    let mut atoms = Vec::new();
    for seq in [2i64, 0, 1] {
        let mut atom = ContentAtom::new(
            format!("atom{seq}"),
            "a1".to_string(),
            AtomType::Text,
            seq,
            anchor.clone(),
        );
        atom.payload_text = Some(format!("text {seq}"));
        atoms.push(atom);
    }
    AtomRepository::insert_batch(&conn, &atoms).await.unwrap();

    let listed = AtomRepository::list_for_asset(&conn, "a1").await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].sequence_index, 0);
    assert_eq!(listed[2].sequence_index, 2);

    AtomRepository::delete_for_asset(&conn, "a1").await.unwrap();
    assert!(AtomRepository::list_for_asset(&conn, "a1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn chunks_track_embedding_references() {
    let (_dir, db) = test_db().await;
    let conn = db.connect().unwrap();

    AssetRepository::upsert(&conn, &test_asset("a1", "/tmp/1.txt"))
        .await
        .unwrap();
    seed_atom(&conn, "a1").await;
    let chunks = vec![
        test_chunk("c1", "a1", "first chunk"),
        test_chunk("c2", "a1", "second chunk"),
    ];
    ChunkRepository::insert_batch(&conn, &chunks).await.unwrap();

    assert_eq!(ChunkRepository::count(&conn).await.unwrap(), 2);
    assert_eq!(
        ChunkRepository::list_without_embeddings(&conn, 100)
            .await
            .unwrap()
            .len(),
        2
    );

    ChunkRepository::update_embedding(&conn, "c1", "c1")
        .await
        .unwrap();
    let unembedded = ChunkRepository::list_without_embeddings(&conn, 100)
        .await
        .unwrap();
    assert_eq!(unembedded.len(), 1);
    assert_eq!(unembedded[0].id, "c2");

    let c1 = ChunkRepository::get(&conn, "c1").await.unwrap().unwrap();
    assert_eq!(c1.embedding_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn annotation_insert_flips_previous_current() {
    let (_dir, db) = test_db().await;
    let conn = db.connect().unwrap();

    AssetRepository::upsert(&conn, &test_asset("a1", "/tmp/1.txt"))
        .await
        .unwrap();
    seed_atom(&conn, "a1").await;
    ChunkRepository::insert(&conn, &test_chunk("c1", "a1", "text"))
        .await
        .unwrap();

    AnnotationRepository::insert(&conn, &test_annotation("ann1", "c1", "model-a"))
        .await
        .unwrap();
    AnnotationRepository::insert(&conn, &test_annotation("ann2", "c1", "model-b"))
        .await
        .unwrap();

    // At most one current annotation per chunk; the newest wins.
    assert_eq!(AnnotationRepository::count_current(&conn).await.unwrap(), 1);
    let current = AnnotationRepository::current_for_chunk(&conn, "c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.id, "ann2");
    assert_eq!(current.model_id, "model-b");
    assert!(current.is_current);
}

#[tokio::test]
async fn watched_volume_re_add_is_idempotent() {
    let (_dir, db) = test_db().await;
    let conn = db.connect().unwrap();

    let volume = WatchedVolume::new("v1".to_string(), "/tmp/watched".to_string(), None);
    VolumeRepository::add(&conn, &volume).await.unwrap();

    let relabeled = WatchedVolume::new(
        "v2".to_string(),
        "/tmp/watched".to_string(),
        Some("docs".to_string()),
    );
    VolumeRepository::add(&conn, &relabeled).await.unwrap();

    let volumes = VolumeRepository::list(&conn).await.unwrap();
    assert_eq!(volumes.len(), 1);
    // Original id survives; only the label refreshes.
    assert_eq!(volumes[0].id, "v1");
    assert_eq!(volumes[0].label.as_deref(), Some("docs"));

    VolumeRepository::touch_scan_time(&conn, "v1").await.unwrap();
    let volumes = VolumeRepository::list(&conn).await.unwrap();
    assert!(volumes[0].last_scan_at.is_some());

    VolumeRepository::remove(&conn, "/tmp/watched").await.unwrap();
    assert!(VolumeRepository::list(&conn).await.unwrap().is_empty());
}

#[tokio::test]
async fn job_upsert_and_latest() {
    let (_dir, db) = test_db().await;
    let conn = db.connect().unwrap();

    let mut job = PipelineJob::new("job1".to_string(), "full_ingest".to_string());
    job.status = JobStatus::Running;
    JobRepository::upsert(&conn, &job).await.unwrap();

    JobRepository::update_status(&conn, "job1", JobStatus::Completed, Some(r#"{"stage":"completed"}"#))
        .await
        .unwrap();

    let latest = JobRepository::latest(&conn, Some("full_ingest"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, "job1");
    assert_eq!(latest.status, JobStatus::Completed);
    assert!(latest.progress_json.unwrap().contains("completed"));

    assert!(JobRepository::latest(&conn, Some("other_type"))
        .await
        .unwrap()
        .is_none());
}

fn vector_record(id: &str, asset_id: &str, vector: Vec<f32>) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        vector,
        text: format!("text for {id}"),
        asset_id: asset_id.to_string(),
        asset_path: format!("/tmp/{asset_id}.txt"),
        evidence_anchor: format!(r#"{{"asset_id":"{asset_id}"}}"#),
        topics: String::new(),
        atom_type: "text".to_string(),
        pipeline_version: "v1.0".to_string(),
    }
}

#[tokio::test]
async fn vector_store_search_orders_by_distance() {
    let (_dir, db) = test_db().await;
    let vectors = VectorStore::new(db, 0);

    vectors
        .add_vectors(vec![
            vector_record("v1", "a1", vec![1.0, 0.0]),
            vector_record("v2", "a1", vec![0.0, 1.0]),
            vector_record("v3", "a2", vec![0.7, 0.7]),
        ])
        .await
        .unwrap();

    assert_eq!(vectors.count().await, 3);
    assert_eq!(vectors.dimension().await, 2);

    let results = vectors.search(&[1.0, 0.0], 3).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].record.id, "v1");
    // Distances are non-decreasing.
    for pair in results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    assert!(results[0].distance.abs() < 1e-5);
}

#[tokio::test]
async fn vector_store_search_empty_cache_returns_empty() {
    let (_dir, db) = test_db().await;
    let vectors = VectorStore::new(db, 0);
    assert!(vectors.search(&[1.0, 0.0], 10).await.is_empty());
}

#[tokio::test]
async fn vector_store_rejects_dimension_mismatch() {
    let (_dir, db) = test_db().await;
    let vectors = VectorStore::new(db, 0);

    vectors
        .add_vectors(vec![vector_record("v1", "a1", vec![1.0, 0.0])])
        .await
        .unwrap();
    let result = vectors
        .add_vectors(vec![vector_record("v2", "a1", vec![1.0, 0.0, 0.0])])
        .await;
    assert!(result.is_err());
    assert_eq!(vectors.count().await, 1);
}

#[tokio::test]
async fn vector_store_persists_across_load_all() {
    let (_dir, db) = test_db().await;

    {
        let vectors = VectorStore::new(db.clone(), 0);
        vectors
            .add_vectors(vec![
                vector_record("v1", "a1", vec![0.1, 0.2, 0.3, 0.4]),
                vector_record("v2", "a2", vec![0.4, 0.3, 0.2, 0.1]),
            ])
            .await
            .unwrap();
    }

    let reloaded = VectorStore::new(db, 768);
    reloaded.load_all().await.unwrap();
    assert_eq!(reloaded.count().await, 2);
    // Dimension is taken from the first persisted vector.
    assert_eq!(reloaded.dimension().await, 4);

    let (ids, vecs, texts) = reloaded.get_all().await;
    assert_eq!(ids.len(), 2);
    assert_eq!(texts.len(), 2);
    let v1_idx = ids.iter().position(|id| id == "v1").unwrap();
    // Blob round-trip is bit-exact.
    assert_eq!(vecs[v1_idx], vec![0.1f32, 0.2, 0.3, 0.4]);
}

#[tokio::test]
async fn vector_store_delete_by_asset_clears_cache_and_rows() {
    let (_dir, db) = test_db().await;
    let vectors = VectorStore::new(db.clone(), 0);

    vectors
        .add_vectors(vec![
            vector_record("v1", "a1", vec![1.0, 0.0]),
            vector_record("v2", "a2", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    vectors.delete_by_asset("a1").await.unwrap();
    assert_eq!(vectors.count().await, 1);

    // The persisted rows agree with the cache.
    let reloaded = VectorStore::new(db, 0);
    reloaded.load_all().await.unwrap();
    assert_eq!(reloaded.count().await, 1);
    let (ids, _, _) = reloaded.get_all().await;
    assert_eq!(ids, vec!["v2".to_string()]);
}
