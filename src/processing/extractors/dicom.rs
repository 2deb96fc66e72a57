use std::collections::HashMap;
use std::fs;

use crate::models::{AtomType, ContentAtom, EvidenceAnchor, FileAsset};
use crate::processing::extractor::{compute_atom_id, file_extension, ExtractResult, Extractor};

/// Minimal DICOM header reader: verifies the DICM magic, walks elements with
/// explicit-VR and implicit-VR heuristics, and keeps a handful of known
/// patient/study tags.
pub struct DicomExtractor;

impl Extractor for DicomExtractor {
    fn name(&self) -> &'static str {
        "dicom"
    }

    fn priority(&self) -> i32 {
        15
    }

    fn can_handle(&self, asset: &FileAsset) -> bool {
        matches!(file_extension(&asset.filename).as_str(), "dcm" | "dicom")
    }

    fn extract(&self, asset: &FileAsset) -> ExtractResult {
        let data = fs::read(&asset.path)?;
        let metadata = parse_dicom_metadata(&data);

        let mut atoms = Vec::new();
        let mut seq_idx = 0i64;

        let mut parts = Vec::new();
        if let Some(v) = metadata.get("PatientName") {
            parts.push(format!("Patient: {v}"));
        }
        if let Some(v) = metadata.get("StudyDescription") {
            parts.push(format!("Study: {v}"));
        }
        if let Some(v) = metadata.get("Modality") {
            parts.push(format!("Modality: {v}"));
        }
        if let Some(v) = metadata.get("Manufacturer") {
            parts.push(format!("Manufacturer: {v}"));
        }

        if !parts.is_empty() {
            let anchor = EvidenceAnchor::for_asset(&asset.id);
            let mut atom = ContentAtom::new(
                compute_atom_id(&asset.id, AtomType::Text, seq_idx),
                asset.id.clone(),
                AtomType::Text,
                seq_idx,
                anchor.to_json(),
            );
            atom.payload_text = Some(parts.join("\n"));
            atoms.push(atom);
            seq_idx += 1;
        }

        if !metadata.is_empty() {
            let anchor = EvidenceAnchor::for_asset(&asset.id);
            let mut atom = ContentAtom::new(
                compute_atom_id(&asset.id, AtomType::Metadata, seq_idx),
                asset.id.clone(),
                AtomType::Metadata,
                seq_idx,
                anchor.to_json(),
            );
            atom.metadata_json = Some(serde_json::to_string(&metadata)?);
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

fn known_tag_name(group: u16, element: u16) -> Option<&'static str> {
    match (group, element) {
        (0x0010, 0x0010) => Some("PatientName"),
        (0x0010, 0x0020) => Some("PatientID"),
        (0x0008, 0x1030) => Some("StudyDescription"),
        (0x0008, 0x103E) => Some("SeriesDescription"),
        (0x0008, 0x0060) => Some("Modality"),
        (0x0008, 0x0070) => Some("Manufacturer"),
        (0x0008, 0x0080) => Some("InstitutionName"),
        (0x0008, 0x0020) => Some("StudyDate"),
        _ => None,
    }
}

fn parse_dicom_metadata(data: &[u8]) -> HashMap<String, String> {
    let mut meta = HashMap::new();

    // DICM magic at byte offset 128.
    if data.len() < 136 || &data[128..132] != b"DICM" {
        return meta;
    }

    let mut offset = 132usize;
    while offset + 8 <= data.len() {
        if offset > 10_000 {
            break;
        }
        let group = u16::from_le_bytes([data[offset], data[offset + 1]]);
        let element = u16::from_le_bytes([data[offset + 2], data[offset + 3]]);
        let vr = [data[offset + 4], data[offset + 5]];

        let is_explicit_long = matches!(
            &vr,
            b"OB" | b"OW" | b"OF" | b"SQ" | b"UC" | b"UN" | b"UR" | b"UT"
        );

        let length: u32;
        if is_explicit_long {
            if offset + 12 > data.len() {
                break;
            }
            length = u32::from_le_bytes([
                data[offset + 8],
                data[offset + 9],
                data[offset + 10],
                data[offset + 11],
            ]);
            offset += 12;
        } else if vr[0].is_ascii_uppercase() && vr[1].is_ascii_uppercase() {
            // Explicit VR, short form.
            length = u16::from_le_bytes([data[offset + 6], data[offset + 7]]) as u32;
            offset += 8;
        } else {
            // Implicit VR.
            length = u32::from_le_bytes([
                data[offset + 4],
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
            ]);
            offset += 8;
        }

        if length == 0xFFFF_FFFF || length > 10_000 {
            break;
        }
        if offset + length as usize > data.len() {
            break;
        }

        if let Some(name) = known_tag_name(group, element) {
            let raw = &data[offset..offset + length as usize];
            let value = String::from_utf8_lossy(raw)
                .trim_end_matches(['\0', ' '])
                .to_string();
            if !value.is_empty() {
                meta.insert(name.to_string(), value);
            }
        }

        offset += length as usize;
    }

    meta
}
