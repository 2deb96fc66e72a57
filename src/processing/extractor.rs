use sha2::{Digest, Sha256};

use crate::error::RefineryError;
use crate::models::{AtomType, ContentAtom, FileAsset};

use super::extractors::{
    ArchiveExtractor, DicomExtractor, EpubExtractor, FallbackExtractor, ImageExtractor,
    PdfExtractor, TextExtractor,
};

/// An extraction error plus the atoms produced before it struck. Archive
/// bomb guards abort the archive but keep what was already extracted.
#[derive(Debug)]
pub struct ExtractFailure {
    pub error: RefineryError,
    pub partial_atoms: Vec<ContentAtom>,
}

impl From<RefineryError> for ExtractFailure {
    fn from(error: RefineryError) -> Self {
        Self {
            error,
            partial_atoms: Vec::new(),
        }
    }
}

impl From<std::io::Error> for ExtractFailure {
    fn from(error: std::io::Error) -> Self {
        RefineryError::from(error).into()
    }
}

impl From<serde_json::Error> for ExtractFailure {
    fn from(error: serde_json::Error) -> Self {
        RefineryError::from(error).into()
    }
}

pub type ExtractResult = std::result::Result<Vec<ContentAtom>, ExtractFailure>;

/// A format handler producing content atoms from a file asset.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> i32;
    fn can_handle(&self, asset: &FileAsset) -> bool;
    fn extract(&self, asset: &FileAsset) -> ExtractResult;
}

/// Deterministic atom ID from (asset, type, sequence).
pub fn compute_atom_id(asset_id: &str, atom_type: AtomType, sequence_index: i64) -> String {
    let digest = Sha256::digest(
        format!("{asset_id}:{}:{sequence_index}", atom_type.as_str()).as_bytes(),
    );
    hex::encode(digest)[..32].to_string()
}

/// Extractors sorted by priority, highest first. The first extractor whose
/// `can_handle` accepts an asset owns its extraction.
pub struct Registry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
        self.extractors.sort_by_key(|e| std::cmp::Reverse(e.priority()));
    }

    pub fn extract(&self, asset: &FileAsset) -> ExtractResult {
        for extractor in &self.extractors {
            if extractor.can_handle(asset) {
                tracing::debug!(
                    extractor = extractor.name(),
                    file = %asset.filename,
                    "Extracting"
                );
                return extractor.extract(asset);
            }
        }
        Err(RefineryError::Extract(format!(
            "no extractor can handle: {}",
            asset.filename
        ))
        .into())
    }

    /// All format handlers, with the generic fallback guaranteeing coverage.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PdfExtractor));
        registry.register(Box::new(EpubExtractor));
        registry.register(Box::new(ImageExtractor));
        registry.register(Box::new(DicomExtractor));
        registry.register(Box::new(TextExtractor));
        registry.register(Box::new(ArchiveExtractor));
        registry.register(Box::new(FallbackExtractor));
        registry
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Lowercased extension of a filename, without the dot.
pub(crate) fn file_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubExtractor {
        name: &'static str,
        priority: i32,
        handles: bool,
    }

    impl Extractor for StubExtractor {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn can_handle(&self, _asset: &FileAsset) -> bool {
            self.handles
        }
        fn extract(&self, asset: &FileAsset) -> ExtractResult {
            let anchor = crate::models::EvidenceAnchor::for_asset(&asset.id);
            let mut atom = ContentAtom::new(
                compute_atom_id(&asset.id, AtomType::Text, 0),
                asset.id.clone(),
                AtomType::Text,
                0,
                anchor.to_json(),
            );
            atom.payload_text = Some(self.name.to_string());
            Ok(vec![atom])
        }
    }

    fn test_asset() -> FileAsset {
        FileAsset::new(
            "asset1".to_string(),
            "/tmp/file.xyz".to_string(),
            "file.xyz".to_string(),
        )
    }

    #[test]
    fn test_registry_prefers_higher_priority() {
        let mut registry = Registry::new();
        registry.register(Box::new(StubExtractor {
            name: "low",
            priority: 1,
            handles: true,
        }));
        registry.register(Box::new(StubExtractor {
            name: "high",
            priority: 10,
            handles: true,
        }));

        let atoms = registry.extract(&test_asset()).unwrap();
        assert_eq!(atoms[0].payload_text.as_deref(), Some("high"));
    }

    #[test]
    fn test_registry_skips_non_handlers() {
        let mut registry = Registry::new();
        registry.register(Box::new(StubExtractor {
            name: "refuses",
            priority: 10,
            handles: false,
        }));
        registry.register(Box::new(StubExtractor {
            name: "accepts",
            priority: 1,
            handles: true,
        }));

        let atoms = registry.extract(&test_asset()).unwrap();
        assert_eq!(atoms[0].payload_text.as_deref(), Some("accepts"));
    }

    #[test]
    fn test_registry_errors_when_nothing_handles() {
        let registry = Registry::new();
        assert!(registry.extract(&test_asset()).is_err());
    }

    #[test]
    fn test_atom_id_is_deterministic_and_type_sensitive() {
        let a = compute_atom_id("asset1", AtomType::Text, 0);
        assert_eq!(a, compute_atom_id("asset1", AtomType::Text, 0));
        assert_eq!(a.len(), 32);
        assert_ne!(a, compute_atom_id("asset1", AtomType::Image, 0));
        assert_ne!(a, compute_atom_id("asset1", AtomType::Text, 1));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("Report.PDF"), "pdf");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("noext"), "");
    }
}
