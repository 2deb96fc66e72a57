use std::fs;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use crate::models::{AtomType, ContentAtom, EvidenceAnchor, FileAsset};
use crate::processing::extractor::{compute_atom_id, file_extension, ExtractResult, Extractor};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "html", "htm", "rtf"];

static RTF_CONTROL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-z]+\d*\s?").expect("valid rtf regex"));

/// Handles plain text, markdown, HTML, and RTF files.
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn can_handle(&self, asset: &FileAsset) -> bool {
        TEXT_EXTENSIONS.contains(&file_extension(&asset.filename).as_str())
    }

    fn extract(&self, asset: &FileAsset) -> ExtractResult {
        let data = fs::read(&asset.path)?;
        let raw = String::from_utf8_lossy(&data).to_string();

        let text = match file_extension(&asset.filename).as_str() {
            "html" | "htm" => html_to_text(&raw),
            "rtf" => strip_rtf(&raw),
            _ => raw,
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

/// Strip markup and unescape entities by parsing and collecting text nodes.
/// Script and style bodies are dropped.
pub(crate) fn html_to_text(html: &str) -> String {
    const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript"];

    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.root_element().descendants() {
        if let Some(text_node) = node.value().as_text() {
            let in_skipped = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
            });
            if in_skipped {
                continue;
            }
            let content = text_node.trim();
            if !content.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(content);
            }
        }
    }
    text
}

/// Strip RTF control words and group braces, keeping the text runs.
pub(crate) fn strip_rtf(rtf: &str) -> String {
    let text = RTF_CONTROL_RE.replace_all(rtf, " ");
    text.replace(['{', '}'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_strips_tags() {
        let html = "<html><body><p>Hello <b>world</b>!</p></body></html>";
        assert_eq!(html_to_text(html), "Hello world !");
    }

    #[test]
    fn test_html_to_text_unescapes_entities() {
        let html = "<p>a &amp; b &lt;c&gt; &quot;d&quot;</p>";
        assert_eq!(html_to_text(html), "a & b <c> \"d\"");
    }

    #[test]
    fn test_html_to_text_drops_script_bodies() {
        let html = "<body><script>var x = 1;</script><p>visible</p></body>";
        assert_eq!(html_to_text(html), "visible");
    }

    #[test]
    fn test_strip_rtf_removes_control_words() {
        let rtf = r"{\rtf1\ansi Hello World}";
        let stripped = strip_rtf(rtf);
        assert!(stripped.contains("Hello World"));
        assert!(!stripped.contains('\\'));
        assert!(!stripped.contains('{'));
    }

    #[test]
    fn test_extract_plain_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        fs::write(&path, "The mitochondria is the powerhouse of the cell.").unwrap();

        let mut asset = FileAsset::new(
            "a1".to_string(),
            path.to_string_lossy().to_string(),
            "note.txt".to_string(),
        );
        asset.size_bytes = 48;

        let extractor = TextExtractor;
        assert!(extractor.can_handle(&asset));
        let atoms = extractor.extract(&asset).unwrap();
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].atom_type, AtomType::Text);
        assert_eq!(
            atoms[0].payload_text.as_deref(),
            Some("The mitochondria is the powerhouse of the cell.")
        );
        assert_eq!(atoms[0].evidence_anchor, r#"{"asset_id":"a1"}"#);
    }

    #[test]
    fn test_extract_empty_file_yields_no_atoms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "   \n  ").unwrap();

        let asset = FileAsset::new(
            "a2".to_string(),
            path.to_string_lossy().to_string(),
            "empty.txt".to_string(),
        );
        let atoms = TextExtractor.extract(&asset).unwrap();
        assert!(atoms.is_empty());
    }
}
