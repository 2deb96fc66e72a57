use std::process::{Command, Stdio};

use crate::error::{RefineryError, Result};
use crate::models::{AtomType, ContentAtom, EvidenceAnchor, FileAsset};
use crate::processing::extractor::{compute_atom_id, file_extension, ExtractResult, Extractor};

use super::extract_with_textutil;

/// Extracts PDF text with `pdftotext` (layout-preserving), falling back to
/// the host's `textutil`.
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn can_handle(&self, asset: &FileAsset) -> bool {
        file_extension(&asset.filename) == "pdf"
    }

    fn extract(&self, asset: &FileAsset) -> ExtractResult {
        let text = match extract_with_pdftotext(&asset.path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "pdftotext failed, trying textutil fallback");
                extract_with_textutil(&asset.path)
                    .map_err(|e| RefineryError::Extract(format!("pdf extraction failed: {e}")))?
            }
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let anchor = EvidenceAnchor::for_asset(&asset.id);
        let mut atom = ContentAtom::new(
            compute_atom_id(&asset.id, AtomType::Text, 0),
            asset.id.clone(),
            AtomType::Text,
            0,
            anchor.to_json(),
        );
        atom.payload_text = Some(text);
        Ok(vec![atom])
    }
}

fn extract_with_pdftotext(path: &str) -> Result<String> {
    let output = Command::new("pdftotext")
        .args(["-layout", path, "-"])
        .stderr(Stdio::null())
        .output()
        .map_err(|e| RefineryError::Extract(format!("pdftotext: {e}")))?;
    if !output.status.success() {
        return Err(RefineryError::Extract(format!(
            "pdftotext exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
