use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::db::repository::AssetRepository;
use crate::db::Database;
use crate::error::{RefineryError, Result};
use crate::models::FileAsset;

/// Aggregate counters from one directory scan.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ScanStats {
    pub new: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl ScanStats {
    pub fn add(&mut self, other: ScanStats) {
        self.new += other.new;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// Deterministic asset ID from (path, mtime_ns, size).
pub fn compute_asset_id(path: &str, mtime_ns: i64, size_bytes: i64) -> String {
    let digest = Sha256::digest(format!("{path}:{mtime_ns}:{size_bytes}").as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// Streaming SHA-256 of a file's bytes.
pub fn compute_content_hash(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// MIME type from the file extension, covering a few types missing from the
/// shared registry.
pub fn guess_mime_type(path: &Path) -> Option<String> {
    if let Some(mime) = mime_guess::from_path(path).first_raw() {
        return Some(mime.to_string());
    }
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "md" | "markdown" => Some("text/markdown".to_string()),
        "epub" => Some("application/epub+zip".to_string()),
        "rtf" => Some("application/rtf".to_string()),
        "heic" | "heif" => Some("image/heic".to_string()),
        "webp" => Some("image/webp".to_string()),
        "dcm" | "dicom" => Some("application/dicom".to_string()),
        _ => None,
    }
}

fn mtime_ns_of(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Walks watched directories and maintains the file-asset manifest.
/// Scanning is idempotent: an unchanged tree yields only `unchanged` counts.
pub struct Scanner {
    db: Database,
    max_file_size: u64,
}

impl Scanner {
    pub fn new(db: Database, max_file_size: u64) -> Self {
        Self { db, max_file_size }
    }

    pub async fn scan_directory(&self, root: &Path) -> Result<ScanStats> {
        if !root.is_dir() {
            return Err(RefineryError::Validation(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        let mut stats = ScanStats::default();
        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Walk error");
                    stats.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Err(e) = self.process_file(entry.path(), &mut stats).await {
                tracing::error!(path = %entry.path().display(), error = %e, "Error processing file");
                stats.errors += 1;
            }
        }
        Ok(stats)
    }

    async fn process_file(&self, path: &Path, stats: &mut ScanStats) -> Result<()> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => {
                stats.skipped += 1;
                return Ok(());
            }
        };
        if metadata.len() > self.max_file_size || metadata.len() == 0 {
            stats.skipped += 1;
            return Ok(());
        }

        let abs_path = std::path::absolute(path)?;
        let abs_str = abs_path.to_string_lossy().to_string();
        let mtime_ns = mtime_ns_of(&metadata);
        let size_bytes = metadata.len() as i64;

        let conn = self.db.connect()?;
        let existing = AssetRepository::get_by_path(&conn, &abs_str).await?;

        if let Some(existing) = &existing {
            if existing.mtime_ns == mtime_ns && existing.size_bytes == size_bytes {
                stats.unchanged += 1;
                return Ok(());
            }
            // Metadata changed; the content hash decides whether the bytes
            // actually did (touch-without-modify).
            let hash = compute_content_hash(&abs_path)?;
            if existing.content_hash.as_deref() == Some(hash.as_str()) {
                stats.unchanged += 1;
                return Ok(());
            }
            self.upsert_asset(&conn, &abs_str, mtime_ns, size_bytes, hash)
                .await?;
            stats.updated += 1;
            tracing::info!(file = %abs_path.display(), "Updated asset");
        } else {
            let hash = compute_content_hash(&abs_path)?;
            self.upsert_asset(&conn, &abs_str, mtime_ns, size_bytes, hash)
                .await?;
            stats.new += 1;
            tracing::debug!(file = %abs_path.display(), "New asset");
        }
        Ok(())
    }

    async fn upsert_asset(
        &self,
        conn: &libsql::Connection,
        abs_path: &str,
        mtime_ns: i64,
        size_bytes: i64,
        content_hash: String,
    ) -> Result<()> {
        let filename = Path::new(abs_path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| abs_path.to_string());
        let asset_id = compute_asset_id(abs_path, mtime_ns, size_bytes);

        let mut asset = FileAsset::new(asset_id, abs_path.to_string(), filename);
        asset.mime_type = guess_mime_type(Path::new(abs_path));
        asset.size_bytes = size_bytes;
        asset.mtime_ns = mtime_ns;
        asset.content_hash = Some(content_hash);
        AssetRepository::upsert(conn, &asset).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_is_deterministic() {
        let a = compute_asset_id("/tmp/a.txt", 123, 456);
        let b = compute_asset_id("/tmp/a.txt", 123, 456);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_asset_id_changes_with_inputs() {
        let base = compute_asset_id("/tmp/a.txt", 123, 456);
        assert_ne!(base, compute_asset_id("/tmp/b.txt", 123, 456));
        assert_ne!(base, compute_asset_id("/tmp/a.txt", 124, 456));
        assert_ne!(base, compute_asset_id("/tmp/a.txt", 123, 457));
    }

    #[test]
    fn test_content_hash_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();
        // sha256("hello")
        assert_eq!(
            compute_content_hash(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_guess_mime_type_special_cases() {
        assert_eq!(
            guess_mime_type(Path::new("notes.md")).as_deref(),
            Some("text/markdown")
        );
        assert_eq!(
            guess_mime_type(Path::new("scan.dcm")).as_deref(),
            Some("application/dicom")
        );
        assert_eq!(
            guess_mime_type(Path::new("book.epub")).as_deref(),
            Some("application/epub+zip")
        );
        assert!(guess_mime_type(Path::new("file.zzz-unknown")).is_none());
    }
}
