use std::fs;

use crate::models::{AtomType, ContentAtom, EvidenceAnchor, FileAsset};
use crate::processing::extractor::{compute_atom_id, ExtractResult, Extractor};

use super::extract_with_textutil;

/// Last-resort extractor: tries the host's `textutil`, then a raw read that
/// is accepted only when the bytes look like text.
pub struct FallbackExtractor;

impl Extractor for FallbackExtractor {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn priority(&self) -> i32 {
        1
    }

    fn can_handle(&self, _asset: &FileAsset) -> bool {
        true
    }

    fn extract(&self, asset: &FileAsset) -> ExtractResult {
        let text = match extract_with_textutil(&asset.path) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => {
                tracing::debug!(file = %asset.filename, "textutil failed, trying raw read");
                let data = fs::read(&asset.path)?;
                if !is_likely_text(&data) {
                    return Ok(Vec::new());
                }
                String::from_utf8_lossy(&data).to_string()
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

/// True when the ratio of NUL/control bytes in the first KiB is under 10%.
fn is_likely_text(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    let check_len = data.len().min(1024);
    let control_count = data[..check_len]
        .iter()
        .filter(|&&b| b == 0 || (b < 32 && b != b'\n' && b != b'\r' && b != b'\t'))
        .count();
    (control_count as f64) / (check_len as f64) < 0.1
}
