use std::fs;
use std::io::Read;
use std::path::{Component, Path};

use flate2::read::GzDecoder;

use crate::error::RefineryError;
use crate::models::{AtomType, ContentAtom, EvidenceAnchor, FileAsset};
use crate::processing::extractor::{
    compute_atom_id, file_extension, ExtractFailure, ExtractResult, Extractor,
};

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "gz", "xz", "7z", "rar", "iso"];

const MAX_ARCHIVE_FILES: usize = 10_000;
const MAX_ARCHIVE_TOTAL_BYTES: u64 = 500 * 1024 * 1024;
const MAX_ARCHIVE_FILE_BYTES: u64 = 50 * 1024 * 1024;

const TEXT_LIKE_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "html", "htm", "rtf", "csv", "json", "xml", "yaml", "yml", "py",
    "go", "js", "ts", "java", "c", "cpp", "h", "rs", "rb", "sh", "bash", "log", "conf", "cfg",
    "ini", "toml", "tex", "bib",
];

/// Walks ZIP and TAR archives under bomb guards (entry count, total and
/// per-entry size, path escapes) and emits one text atom per text-like
/// member, anchored by its inner path.
pub struct ArchiveExtractor;

impl Extractor for ArchiveExtractor {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn priority(&self) -> i32 {
        5
    }

    fn can_handle(&self, asset: &FileAsset) -> bool {
        ARCHIVE_EXTENSIONS.contains(&file_extension(&asset.filename).as_str())
    }

    fn extract(&self, asset: &FileAsset) -> ExtractResult {
        match file_extension(&asset.filename).as_str() {
            "zip" => extract_zip(asset),
            "tar" => extract_tar(asset, false),
            "gz" => extract_tar(asset, true),
            other => Err(RefineryError::Extract(format!(
                "unsupported archive format: .{other}"
            ))
            .into()),
        }
    }
}

fn is_text_like(name: &str) -> bool {
    TEXT_LIKE_EXTENSIONS.contains(&file_extension(name).as_str())
}

/// Reject absolute paths and paths that climb out of the archive root.
fn is_unsafe_path(name: &str) -> bool {
    let path = Path::new(name);
    path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}

fn make_text_atom(asset: &FileAsset, seq_idx: i64, inner_path: &str, text: String) -> ContentAtom {
    let mut anchor = EvidenceAnchor::for_asset(&asset.id);
    anchor.archive_chain = Some(inner_path.to_string());
    let mut atom = ContentAtom::new(
        compute_atom_id(&asset.id, AtomType::Text, seq_idx),
        asset.id.clone(),
        AtomType::Text,
        seq_idx,
        anchor.to_json(),
    );
    atom.payload_text = Some(text);
    atom
}

fn extract_zip(asset: &FileAsset) -> ExtractResult {
    let file = fs::File::open(&asset.path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| RefineryError::Extract(format!("open zip: {e}")))?;

    if archive.len() > MAX_ARCHIVE_FILES {
        return Err(RefineryError::ArchiveSafety(format!(
            "too many archive entries ({})",
            archive.len()
        ))
        .into());
    }

    let mut atoms = Vec::new();
    let mut total_size = 0u64;
    let mut seq_idx = 0i64;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        if is_unsafe_path(&name) {
            tracing::warn!(name = %name, "Skipping suspicious archive member");
            continue;
        }
        if entry.size() > MAX_ARCHIVE_FILE_BYTES {
            continue;
        }
        total_size += entry.size();
        if total_size > MAX_ARCHIVE_TOTAL_BYTES {
            tracing::warn!(file = %asset.filename, "Archive total size exceeded");
            return Err(ExtractFailure {
                error: RefineryError::ArchiveSafety("archive total size exceeded".to_string()),
                partial_atoms: atoms,
            });
        }

        if !is_text_like(&name) {
            continue;
        }

        let mut data = Vec::new();
        if entry
            .by_ref()
            .take(MAX_ARCHIVE_FILE_BYTES)
            .read_to_end(&mut data)
            .is_err()
        {
            continue;
        }

        let text = String::from_utf8_lossy(&data).trim().to_string();
        if text.is_empty() {
            continue;
        }
        atoms.push(make_text_atom(asset, seq_idx, &name, text));
        seq_idx += 1;
    }

    Ok(atoms)
}

fn extract_tar(asset: &FileAsset, is_gzip: bool) -> ExtractResult {
    let file = fs::File::open(&asset.path)?;
    let reader: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut archive = tar::Archive::new(reader);

    let mut atoms = Vec::new();
    let mut total_size = 0u64;
    let mut file_count = 0usize;
    let mut seq_idx = 0i64;

    let entries = archive
        .entries()
        .map_err(|e| RefineryError::Extract(format!("open tar: {e}")))?;

    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(_) => break,
        };
        if !entry.header().entry_type().is_file() {
            continue;
        }

        file_count += 1;
        if file_count > MAX_ARCHIVE_FILES {
            return Err(ExtractFailure {
                error: RefineryError::ArchiveSafety("too many archive entries".to_string()),
                partial_atoms: atoms,
            });
        }

        let name = match entry.path() {
            Ok(path) => path.to_string_lossy().to_string(),
            Err(_) => continue,
        };
        if is_unsafe_path(&name) {
            continue;
        }

        let size = entry.header().size().unwrap_or(0);
        if size > MAX_ARCHIVE_FILE_BYTES {
            continue;
        }
        total_size += size;
        if total_size > MAX_ARCHIVE_TOTAL_BYTES {
            return Err(ExtractFailure {
                error: RefineryError::ArchiveSafety("archive total size exceeded".to_string()),
                partial_atoms: atoms,
            });
        }

        if !is_text_like(&name) {
            continue;
        }

        let mut data = Vec::new();
        if entry
            .by_ref()
            .take(MAX_ARCHIVE_FILE_BYTES)
            .read_to_end(&mut data)
            .is_err()
        {
            continue;
        }

        let text = String::from_utf8_lossy(&data).trim().to_string();
        if text.is_empty() {
            continue;
        }
        atoms.push(make_text_atom(asset, seq_idx, &name, text));
        seq_idx += 1;
    }

    Ok(atoms)
}
