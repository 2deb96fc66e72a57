mod archive;
mod dicom;
mod epub;
mod fallback;
mod image;
mod pdf;
mod text;

pub use archive::ArchiveExtractor;
pub use dicom::DicomExtractor;
pub use epub::EpubExtractor;
pub use fallback::FallbackExtractor;
pub use image::ImageExtractor;
pub use pdf::PdfExtractor;
pub use text::TextExtractor;

use std::process::{Command, Stdio};

use crate::error::{RefineryError, Result};

/// Convert a document to plain text with the host's `textutil`. Used as the
/// PDF fallback and by the generic extractor.
pub(crate) fn extract_with_textutil(path: &str) -> Result<String> {
    let output = Command::new("textutil")
        .args(["-convert", "txt", "-stdout", path])
        .stderr(Stdio::null())
        .output()
        .map_err(|e| RefineryError::Extract(format!("textutil: {e}")))?;
    if !output.status.success() {
        return Err(RefineryError::Extract(format!(
            "textutil exited with {}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
