use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::{RefineryError, Result};
use crate::models::{AtomType, ContentAtom, EvidenceAnchor, FileAsset};
use crate::processing::extractor::{compute_atom_id, file_extension, ExtractResult, Extractor};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "heic", "heif", "tiff", "tif",
];

/// Runs the host platform's OCR over images, emitting a text atom when OCR
/// finds anything plus an image-reference atom pointing back at the file.
pub struct ImageExtractor;

impl Extractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn priority(&self) -> i32 {
        15
    }

    fn can_handle(&self, asset: &FileAsset) -> bool {
        IMAGE_EXTENSIONS.contains(&file_extension(&asset.filename).as_str())
    }

    fn extract(&self, asset: &FileAsset) -> ExtractResult {
        let mut atoms = Vec::new();
        let mut seq_idx = 0i64;

        let ocr_text = match vision_ocr(&asset.path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(file = %asset.filename, error = %e, "Vision OCR failed");
                String::new()
            }
        };

        if !ocr_text.is_empty() {
            let anchor = EvidenceAnchor::for_asset(&asset.id);
            let mut atom = ContentAtom::new(
                compute_atom_id(&asset.id, AtomType::Text, seq_idx),
                asset.id.clone(),
                AtomType::Text,
                seq_idx,
                anchor.to_json(),
            );
            atom.payload_text = Some(ocr_text);
            atoms.push(atom);
            seq_idx += 1;
        }

        let anchor = EvidenceAnchor::for_asset(&asset.id);
        let mut image_atom = ContentAtom::new(
            compute_atom_id(&asset.id, AtomType::Image, seq_idx),
            asset.id.clone(),
            AtomType::Image,
            seq_idx,
            anchor.to_json(),
        );
        image_atom.payload_ref = Some(asset.path.clone());
        atoms.push(image_atom);

        Ok(atoms)
    }
}

/// Recognize text with the macOS Vision framework via a Swift subprocess.
fn vision_ocr(image_path: &str) -> Result<String> {
    let swift_code = format!(
        r#"
import Foundation
import Vision
import AppKit

let url = URL(fileURLWithPath: "{image_path}")
guard let image = NSImage(contentsOf: url),
      let tiffData = image.tiffRepresentation,
      let bitmap = NSBitmapImageRep(data: tiffData),
      let cgImage = bitmap.cgImage else {{
    exit(1)
}}

let request = VNRecognizeTextRequest()
request.recognitionLevel = .accurate
request.usesLanguageCorrection = true

let handler = VNImageRequestHandler(cgImage: cgImage, options: [:])
try handler.perform([request])

guard let observations = request.results else {{ exit(0) }}
for observation in observations {{
    if let candidate = observation.topCandidates(1).first {{
        print(candidate.string)
    }}
}}
"#
    );

    let mut child = Command::new("swift")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| RefineryError::Extract(format!("swift: {e}")))?;

    if let Some(stdin) = child.stdin.as_mut() {
        stdin
            .write_all(swift_code.as_bytes())
            .map_err(|e| RefineryError::Extract(format!("swift stdin: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| RefineryError::Extract(format!("swift: {e}")))?;
    if !output.status.success() {
        return Err(RefineryError::Extract(format!(
            "vision OCR exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
