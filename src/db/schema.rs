use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- File assets: one row per tracked file
        CREATE TABLE IF NOT EXISTS file_assets (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            filename TEXT NOT NULL,
            uti TEXT,
            mime_type TEXT,
            size_bytes INTEGER,
            mtime_ns INTEGER,
            content_hash TEXT,
            scan_version INTEGER DEFAULT 1,
            status TEXT DEFAULT 'pending',
            error_message TEXT,
            created_at TEXT,
            updated_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_file_assets_path ON file_assets(path);
        CREATE INDEX IF NOT EXISTS idx_file_assets_status ON file_assets(status);
        CREATE INDEX IF NOT EXISTS idx_file_assets_content_hash ON file_assets(content_hash);

        -- Content atoms extracted from assets
        CREATE TABLE IF NOT EXISTS content_atoms (
            id TEXT PRIMARY KEY,
            asset_id TEXT REFERENCES file_assets(id),
            atom_type TEXT NOT NULL,
            sequence_index INTEGER,
            payload_text TEXT,
            payload_ref TEXT,
            metadata_json TEXT,
            evidence_anchor TEXT NOT NULL,
            created_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_content_atoms_asset ON content_atoms(asset_id);

        -- Token-bounded chunks derived from text atoms
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            atom_id TEXT REFERENCES content_atoms(id),
            asset_id TEXT REFERENCES file_assets(id),
            chunk_text TEXT NOT NULL,
            token_count INTEGER,
            chunk_index INTEGER,
            evidence_anchor TEXT NOT NULL,
            embedding_id TEXT,
            pipeline_version TEXT,
            created_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_asset ON chunks(asset_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_atom ON chunks(atom_id);

        -- Versioned LLM annotations, at most one current per chunk
        CREATE TABLE IF NOT EXISTS annotations (
            id TEXT PRIMARY KEY,
            chunk_id TEXT REFERENCES chunks(id),
            model_id TEXT NOT NULL,
            prompt_id TEXT NOT NULL,
            prompt_version TEXT NOT NULL,
            pipeline_version TEXT NOT NULL,
            topics_json TEXT,
            sentiment_label TEXT,
            sentiment_confidence REAL,
            entities_json TEXT,
            claims_json TEXT,
            summary TEXT,
            quality_flags_json TEXT,
            is_current INTEGER DEFAULT 1,
            created_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_annotations_chunk ON annotations(chunk_id);
        CREATE INDEX IF NOT EXISTS idx_annotations_current ON annotations(is_current);

        -- Concept clusters
        CREATE TABLE IF NOT EXISTS concept_nodes (
            id TEXT PRIMARY KEY,
            level INTEGER NOT NULL,
            label TEXT,
            description TEXT,
            parent_id TEXT REFERENCES concept_nodes(id),
            exemplar_chunk_ids TEXT,
            pipeline_version TEXT,
            model_id TEXT,
            created_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_concept_nodes_level ON concept_nodes(level);

        -- Typed weighted edges between concepts and chunks
        CREATE TABLE IF NOT EXISTS graph_edges (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            target_id TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            weight REAL,
            evidence_json TEXT,
            pipeline_version TEXT,
            created_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges(source_id);
        CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target_id);

        -- Pipeline run records
        CREATE TABLE IF NOT EXISTS pipeline_jobs (
            id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            status TEXT DEFAULT 'pending',
            progress_json TEXT,
            created_at TEXT,
            updated_at TEXT
        );

        -- User-declared source directories
        CREATE TABLE IF NOT EXISTS watched_volumes (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            label TEXT,
            added_at TEXT,
            last_scan_at TEXT
        );

        -- Persisted embeddings backing the in-memory vector cache
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            id TEXT PRIMARY KEY,
            vector BLOB NOT NULL,
            text TEXT NOT NULL,
            asset_id TEXT NOT NULL,
            asset_path TEXT NOT NULL,
            evidence_anchor TEXT,
            topics TEXT,
            atom_type TEXT,
            pipeline_version TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_chunk_vectors_asset ON chunk_vectors(asset_id);
        "#,
    )
    .await?;

    Ok(())
}
