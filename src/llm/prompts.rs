//! Prompt templates sent to the local inference server.

pub const ANNOTATION_PROMPT_ID: &str = "annotate_chunk_v1";
pub const ANNOTATION_PROMPT_VERSION: &str = "1.0";

pub const ANNOTATION_PROMPT: &str = r#"You are a knowledge extraction assistant. Analyze the following text chunk and produce a JSON object with these fields:
- "topics": array of topic labels (2-5 labels)
- "sentiment": {"label": "positive"|"negative"|"neutral"|"mixed", "confidence": 0.0-1.0}
- "entities": array of {"name": string, "type": "person"|"org"|"location"|"concept"|"date"|"other"}
- "claims": array of {"claim": string, "confidence": 0.0-1.0}
- "summary": a 1-2 sentence summary
- "quality_flags": array of any quality issues (e.g., "truncated", "low_quality", "technical", "multilingual")

Respond with ONLY the JSON object, no other text."#;

/// Builds the concept-labeling prompt from exemplar excerpts.
pub fn concept_label_prompt(exemplar_texts: &[String]) -> String {
    let mut prompt = String::from(
        "Given the following representative text excerpts from a cluster of related documents, \
         provide a concise concept label and description.\n\n\
         Respond with a JSON object:\n\
         - \"label\": a short (2-5 word) concept label\n\
         - \"description\": a 1-2 sentence description of what this concept cluster represents\n\
         - \"keywords\": array of 3-7 keywords that characterize this concept\n\n\
         Respond with ONLY the JSON object, no other text.\n\nExcerpts:\n",
    );
    for (i, text) in exemplar_texts.iter().enumerate() {
        prompt.push_str(&format!("\n--- Excerpt {} ---\n{}\n", i + 1, text));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_label_prompt_numbers_excerpts() {
        let prompt = concept_label_prompt(&["first".to_string(), "second".to_string()]);
        assert!(prompt.contains("--- Excerpt 1 ---\nfirst"));
        assert!(prompt.contains("--- Excerpt 2 ---\nsecond"));
        assert!(prompt.contains("\"keywords\""));
    }
}
