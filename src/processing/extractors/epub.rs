use std::fs;
use std::io::Read;

use serde::Deserialize;

use crate::error::{RefineryError, Result};
use crate::models::{AtomType, ContentAtom, EvidenceAnchor, FileAsset};
use crate::processing::extractor::{compute_atom_id, file_extension, ExtractResult, Extractor};

use super::text::html_to_text;

/// Reads EPUB e-books as ZIP containers: container.xml names the OPF
/// package, whose spine fixes the reading order of the chapter documents.
pub struct EpubExtractor;

impl Extractor for EpubExtractor {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn priority(&self) -> i32 {
        18
    }

    fn can_handle(&self, asset: &FileAsset) -> bool {
        file_extension(&asset.filename) == "epub"
    }

    fn extract(&self, asset: &FileAsset) -> ExtractResult {
        let file = fs::File::open(&asset.path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| RefineryError::Extract(format!("open epub: {e}")))?;

        let opf_path = find_opf_path(&mut archive)?;
        let spine_items = parse_opf(&mut archive, &opf_path)?;

        let opf_dir = std::path::Path::new(&opf_path)
            .parent()
            .map(|dir| dir.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut atoms = Vec::new();
        let mut seq_idx = 0i64;

        for item in spine_items {
            let item_path = if opf_dir.is_empty() || opf_dir == "." {
                item.href.clone()
            } else {
                format!("{opf_dir}/{}", item.href)
            };

            let Some(data) = read_zip_entry(&mut archive, &item_path) else {
                continue;
            };

            let text = html_to_text(&String::from_utf8_lossy(&data));
            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }

            let mut anchor = EvidenceAnchor::for_asset(&asset.id);
            anchor.chapter = Some(item.id.clone());
            let mut atom = ContentAtom::new(
                compute_atom_id(&asset.id, AtomType::Text, seq_idx),
                asset.id.clone(),
                AtomType::Text,
                seq_idx,
                anchor.to_json(),
            );
            atom.payload_text = Some(text);
            atoms.push(atom);
            seq_idx += 1;
        }

        Ok(atoms)
    }
}

struct SpineItem {
    id: String,
    href: String,
}

#[derive(Deserialize)]
struct ContainerXml {
    rootfiles: Rootfiles,
}

#[derive(Deserialize)]
struct Rootfiles {
    #[serde(rename = "rootfile", default)]
    rootfiles: Vec<Rootfile>,
}

#[derive(Deserialize)]
struct Rootfile {
    #[serde(rename = "@full-path")]
    full_path: String,
}

#[derive(Deserialize)]
struct OpfPackage {
    manifest: OpfManifest,
    spine: OpfSpine,
}

#[derive(Deserialize)]
struct OpfManifest {
    #[serde(rename = "item", default)]
    items: Vec<OpfItem>,
}

#[derive(Deserialize)]
struct OpfItem {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@href")]
    href: String,
}

#[derive(Deserialize)]
struct OpfSpine {
    #[serde(rename = "itemref", default)]
    itemrefs: Vec<OpfItemRef>,
}

#[derive(Deserialize)]
struct OpfItemRef {
    #[serde(rename = "@idref")]
    idref: String,
}

fn read_zip_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Option<Vec<u8>> {
    let wanted = name.replace('\\', "/");
    let index = (0..archive.len()).find(|&i| {
        archive
            .by_index(i)
            .map(|f| f.name().replace('\\', "/") == wanted)
            .unwrap_or(false)
    })?;
    let mut file = archive.by_index(index).ok()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).ok()?;
    Some(data)
}

fn find_opf_path<R: Read + std::io::Seek>(archive: &mut zip::ZipArchive<R>) -> Result<String> {
    let data = read_zip_entry(archive, "META-INF/container.xml")
        .ok_or_else(|| RefineryError::Extract("container.xml not found in EPUB".to_string()))?;
    let container: ContainerXml = quick_xml::de::from_str(&String::from_utf8_lossy(&data))
        .map_err(|e| RefineryError::Extract(format!("parse container.xml: {e}")))?;
    container
        .rootfiles
        .rootfiles
        .first()
        .map(|rf| rf.full_path.clone())
        .ok_or_else(|| RefineryError::Extract("no rootfile in container.xml".to_string()))
}

fn parse_opf<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    opf_path: &str,
) -> Result<Vec<SpineItem>> {
    let data = read_zip_entry(archive, opf_path)
        .ok_or_else(|| RefineryError::Extract(format!("OPF file not found: {opf_path}")))?;
    let package: OpfPackage = quick_xml::de::from_str(&String::from_utf8_lossy(&data))
        .map_err(|e| RefineryError::Extract(format!("parse OPF: {e}")))?;

    let items: std::collections::HashMap<&str, &str> = package
        .manifest
        .items
        .iter()
        .map(|item| (item.id.as_str(), item.href.as_str()))
        .collect();

    Ok(package
        .spine
        .itemrefs
        .iter()
        .filter_map(|itemref| {
            items.get(itemref.idref.as_str()).map(|href| SpineItem {
                id: itemref.idref.clone(),
                href: href.to_string(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_epub(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("book.epub");
        let file = fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        writer
            .start_file("META-INF/container.xml", options)
            .unwrap();
        writer
            .write_all(
                br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
            )
            .unwrap();

        writer.start_file("OEBPS/content.opf", options).unwrap();
        writer
            .write_all(
                br#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <manifest>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="ch2"/>
    <itemref idref="ch1"/>
  </spine>
</package>"#,
            )
            .unwrap();

        writer.start_file("OEBPS/ch1.xhtml", options).unwrap();
        writer
            .write_all(b"<html><body><p>First chapter text.</p></body></html>")
            .unwrap();
        writer.start_file("OEBPS/ch2.xhtml", options).unwrap();
        writer
            .write_all(b"<html><body><p>Second chapter text.</p></body></html>")
            .unwrap();
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_epub_spine_order_and_chapter_anchors() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_epub(dir.path());

        let asset = FileAsset::new(
            "epub1".to_string(),
            path.to_string_lossy().to_string(),
            "book.epub".to_string(),
        );
        let atoms = EpubExtractor.extract(&asset).unwrap();

        // Spine order, not manifest order.
        assert_eq!(atoms.len(), 2);
        assert_eq!(atoms[0].payload_text.as_deref(), Some("Second chapter text."));
        assert_eq!(atoms[1].payload_text.as_deref(), Some("First chapter text."));

        let anchor0 = EvidenceAnchor::parse(&atoms[0].evidence_anchor).unwrap();
        assert_eq!(anchor0.chapter.as_deref(), Some("ch2"));
        assert_eq!(atoms[0].sequence_index, 0);
        assert_eq!(atoms[1].sequence_index, 1);
    }

    #[test]
    fn test_epub_without_container_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.epub");
        let file = fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("mimetype", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"application/epub+zip").unwrap();
        writer.finish().unwrap();

        let asset = FileAsset::new(
            "epub2".to_string(),
            path.to_string_lossy().to_string(),
            "broken.epub".to_string(),
        );
        assert!(EpubExtractor.extract(&asset).is_err());
    }
}
