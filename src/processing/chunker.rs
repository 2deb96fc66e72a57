use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tiktoken_rs::CoreBPE;

use crate::config::PipelineConfig;
use crate::models::{AtomType, Chunk, ContentAtom};

static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| {
    tiktoken_rs::cl100k_base()
        .map_err(|e| {
            tracing::warn!(error = %e, "cl100k_base unavailable, using word-based estimate");
            e
        })
        .ok()
});

static SENTENCE_BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("valid sentence regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Token count via cl100k_base, or word count x 1.33 when the tokenizer is
/// unavailable.
pub fn count_tokens(text: &str) -> usize {
    match ENCODER.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => (text.split_whitespace().count() as f64 * 1.33) as usize,
    }
}

/// Case-fold and collapse whitespace for stable hashing.
pub fn normalize_text(text: &str) -> String {
    WHITESPACE_RE
        .replace_all(text.trim().to_lowercase().as_str(), " ")
        .to_string()
}

/// Deterministic chunk ID:
/// sha256("{asset_id}:{anchor_json}:{hex(sha256(normalized_text))}")[..32].
pub fn compute_chunk_id(asset_id: &str, anchor_json: &str, text: &str) -> String {
    let norm_hash = hex::encode(Sha256::digest(normalize_text(text).as_bytes()));
    let digest = Sha256::digest(format!("{asset_id}:{anchor_json}:{norm_hash}").as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// Token-aware sentence-preserving splitter with overlap.
pub struct Chunker {
    target: usize,
    min: usize,
    max: usize,
    overlap: usize,
    pipeline_version: String,
}

impl Chunker {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            target: config.chunk_target_tokens,
            min: config.chunk_min_tokens,
            max: config.chunk_max_tokens,
            overlap: config.chunk_overlap_tokens,
            pipeline_version: config.version.clone(),
        }
    }

    /// Tighten chunk sizes to the model's context window. Values only ever
    /// shrink; a large context leaves the configured defaults alone.
    pub fn adapt_to_context(&mut self, context_length: usize) {
        let available = context_length.saturating_sub(2000).max(400);
        let new_target = (available * 6 / 10).min(self.target);
        let new_max = (available * 8 / 10).min(self.max);
        let new_min = (new_target * 2 / 3).min(self.min);
        if new_max != self.max || new_target != self.target || new_min != self.min {
            tracing::info!(
                context = context_length,
                target = new_target,
                min = new_min,
                max = new_max,
                "Adapted chunk sizes to context"
            );
            self.target = new_target;
            self.min = new_min;
            self.max = new_max;
        }
    }

    /// Split an asset's text atoms into chunks, one chunk index series
    /// across all atoms. Non-text atoms are skipped.
    pub fn chunk_atoms(&self, atoms: &[ContentAtom], asset_id: &str) -> Vec<Chunk> {
        let mut all_chunks = Vec::new();
        let mut chunk_index = 0i64;

        for atom in atoms {
            if atom.atom_type != AtomType::Text {
                continue;
            }
            let Some(text) = atom.payload_text.as_deref() else {
                continue;
            };

            for chunk_text in self.split_text(text) {
                let token_count = count_tokens(&chunk_text) as i64;
                let chunk_id = compute_chunk_id(asset_id, &atom.evidence_anchor, &chunk_text);
                all_chunks.push(Chunk::new(
                    chunk_id,
                    atom.id.clone(),
                    asset_id.to_string(),
                    chunk_text,
                    token_count,
                    chunk_index,
                    atom.evidence_anchor.clone(),
                    self.pipeline_version.clone(),
                ));
                chunk_index += 1;
            }
        }
        all_chunks
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        if count_tokens(text) <= self.max {
            return vec![text.to_string()];
        }

        let sentences = self.split_sentences(text);
        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0usize;

        for sentence in sentences {
            let sent_tokens = count_tokens(&sentence);

            if current_tokens + sent_tokens > self.max && !current.is_empty() {
                let chunk_text = current.join(" ").trim().to_string();
                if count_tokens(&chunk_text) >= self.min {
                    chunks.push(chunk_text);
                }

                // Carry a trailing suffix of whole sentences as overlap.
                let mut overlap_tokens = 0usize;
                let mut overlap_start = current.len();
                for i in (0..current.len()).rev() {
                    let st = count_tokens(&current[i]);
                    if overlap_tokens + st > self.overlap {
                        break;
                    }
                    overlap_tokens += st;
                    overlap_start = i;
                }
                current.drain(..overlap_start);
                current_tokens = current.iter().map(|s| count_tokens(s)).sum();
            }

            current_tokens += sent_tokens;
            current.push(sentence);
        }

        if !current.is_empty() {
            let chunk_text = current.join(" ").trim().to_string();
            if !chunk_text.is_empty() {
                chunks.push(chunk_text);
            }
        }

        chunks
    }

    fn split_sentences(&self, text: &str) -> Vec<String> {
        let boundaries: Vec<_> = SENTENCE_BOUNDARY_RE.find_iter(text).collect();
        if boundaries.is_empty() {
            return split_long_block(text);
        }

        let mut parts = Vec::new();
        let mut start = 0usize;
        for m in &boundaries {
            // Keep the punctuation with the preceding sentence.
            let end = m.start() + 1;
            let part = text[start..end].trim();
            if !part.is_empty() {
                parts.push(part.to_string());
            }
            start = m.end();
        }
        if start < text.len() {
            let part = text[start..].trim();
            if !part.is_empty() {
                parts.push(part.to_string());
            }
        }

        // A sentence still over the cap gets split on newlines. A single
        // over-long line passes through unsplit.
        let mut result = Vec::new();
        for part in parts {
            if count_tokens(&part) > self.max {
                result.extend(split_long_block(&part));
            } else {
                result.push(part);
            }
        }
        result
    }
}

fn split_long_block(text: &str) -> Vec<String> {
    let mut result: Vec<String> = text
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if result.is_empty() && !text.trim().is_empty() {
        result.push(text.trim().to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvidenceAnchor;

    fn test_chunker(min: usize, max: usize, overlap: usize) -> Chunker {
        Chunker {
            target: max * 3 / 4,
            min,
            max,
            overlap,
            pipeline_version: "v1.0".to_string(),
        }
    }

    fn text_atom(asset_id: &str, seq: i64, text: &str) -> ContentAtom {
        let anchor = EvidenceAnchor::for_asset(asset_id);
        let mut atom = ContentAtom::new(
            crate::processing::compute_atom_id(asset_id, AtomType::Text, seq),
            asset_id.to_string(),
            AtomType::Text,
            seq,
            anchor.to_json(),
        );
        atom.payload_text = Some(text.to_string());
        atom
    }

    #[test]
    fn test_chunk_id_matches_reference_construction() {
        // sha256("abc:" + anchor_json + ":" + hex(sha256("hello, world.")))[..32]
        let anchor_json = r#"{"asset_id":"abc"}"#;
        let id = compute_chunk_id("abc", anchor_json, "Hello, world.");

        let norm_hash = hex::encode(Sha256::digest(b"hello, world."));
        let expected_full =
            hex::encode(Sha256::digest(format!("abc:{anchor_json}:{norm_hash}").as_bytes()));
        assert_eq!(id, expected_full[..32]);
    }

    #[test]
    fn test_chunk_id_is_stable_across_runs() {
        let anchor = r#"{"asset_id":"x"}"#;
        assert_eq!(
            compute_chunk_id("x", anchor, "Some Text"),
            compute_chunk_id("x", anchor, "some   text")
        );
        assert_ne!(
            compute_chunk_id("x", anchor, "some text"),
            compute_chunk_id("x", anchor, "other text")
        );
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello\t\nWORLD  "), "hello world");
        assert_eq!(normalize_text("a  b   c"), "a b c");
    }

    #[test]
    fn test_count_tokens_nonzero_for_text() {
        assert!(count_tokens("hello world") >= 2);
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = test_chunker(5, 100, 10);
        let atoms = vec![text_atom("a1", 0, "Short text. Nothing more.")];
        let chunks = chunker.chunk_atoms(&atoms, "a1");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_text, "Short text. Nothing more.");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_long_text_splits_at_sentence_boundaries() {
        let chunker = test_chunker(2, 20, 5);
        let sentence = "The quick brown fox jumps over the lazy dog.";
        let text = vec![sentence; 10].join(" ");
        let atoms = vec![text_atom("a1", 0, &text)];
        let chunks = chunker.chunk_atoms(&atoms, "a1");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chunk_text.contains("fox"));
        }
        // Indexes form one series.
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_overlap_carries_trailing_sentences() {
        let chunker = test_chunker(2, 25, 12);
        let text = "Alpha sentence one here. Beta sentence two here. \
                    Gamma sentence three here. Delta sentence four here. \
                    Epsilon sentence five here. Zeta sentence six here.";
        let chunks: Vec<String> = chunker.split_text(text);
        assert!(chunks.len() > 1);
        // Some sentence from the end of a chunk reappears at the start of
        // the next.
        let first_tail = chunks[0].split(". ").last().unwrap().to_string();
        assert!(chunks[1].contains(first_tail.trim_end_matches('.')));
    }

    #[test]
    fn test_no_sentence_boundaries_falls_back_to_newlines() {
        let chunker = test_chunker(1, 5, 0);
        let text = "word word word word word word\nmore words on another line\nthird line words";
        let chunks = chunker.split_text(text);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn test_single_overlong_line_is_one_chunk() {
        // The observed open edge: no boundaries, no newlines, one chunk
        // larger than max.
        let chunker = test_chunker(1, 5, 0);
        let text = "w ".repeat(50);
        let chunks = chunker.split_text(text.trim());
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_non_text_atoms_are_skipped() {
        let chunker = test_chunker(5, 100, 10);
        let anchor = EvidenceAnchor::for_asset("a1");
        let mut image_atom = ContentAtom::new(
            "img".to_string(),
            "a1".to_string(),
            AtomType::Image,
            0,
            anchor.to_json(),
        );
        image_atom.payload_ref = Some("/x/img.png".to_string());
        let atoms = vec![image_atom, text_atom("a1", 1, "Actual text here.")];
        let chunks = chunker.chunk_atoms(&atoms, "a1");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_text, "Actual text here.");
    }

    #[test]
    fn test_adapt_to_context_only_tightens() {
        let mut chunker = test_chunker(400, 800, 50);
        chunker.target = 600;

        // Huge context: nothing shrinks.
        chunker.adapt_to_context(100_000);
        assert_eq!(chunker.target, 600);
        assert_eq!(chunker.max, 800);
        assert_eq!(chunker.min, 400);

        // Small context: everything tightens.
        chunker.adapt_to_context(4096);
        let available = 4096 - 2000;
        assert_eq!(chunker.target, available * 6 / 10);
        assert_eq!(chunker.max, available * 8 / 10);
        assert_eq!(chunker.min, available * 6 / 10 * 2 / 3);
    }

    #[test]
    fn test_adapt_to_context_floors_available_at_400() {
        let mut chunker = test_chunker(400, 800, 50);
        chunker.adapt_to_context(1000);
        assert_eq!(chunker.max, 400 * 8 / 10);
    }

    #[test]
    fn test_empty_atom_produces_no_chunks() {
        let chunker = test_chunker(5, 100, 10);
        let atoms = vec![text_atom("a1", 0, "   ")];
        assert!(chunker.chunk_atoms(&atoms, "a1").is_empty());
    }
}
