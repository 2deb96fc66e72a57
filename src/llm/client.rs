use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;

use crate::error::{RefineryError, Result};

const EMBED_MODEL_KEYWORDS: &[&str] = &["embed", "e5", "bge", "gte", "nomic"];
const CHAT_MODEL_EXCLUDE_KEYWORDS: &[&str] = &["embed", "e5", "bge", "gte", "nomic", "whisper"];
const DEFAULT_CONTEXT_LENGTH: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// Thin client for the inference server's OpenAI-compatible API. The server
/// is trusted-local but unreliable; every call returns a result or an error
/// and no retries happen here.
pub struct LmStudioClient {
    base_url: String,
    root_url: String,
    http: reqwest::Client,
    context_length: OnceCell<usize>,
}

impl LmStudioClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let root_url = base_url
            .strip_suffix("/v1")
            .unwrap_or(&base_url)
            .to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            root_url,
            http,
            context_length: OnceCell::new(),
        }
    }

    /// Healthy iff the server lists at least one model.
    pub async fn health_check(&self) -> bool {
        !self.list_models().await.is_empty()
    }

    pub async fn list_models(&self) -> Vec<ModelEntry> {
        let url = format!("{}/models", self.base_url);
        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "LM Studio model listing failed");
                return Vec::new();
            }
        };
        match resp.json::<ModelsResponse>().await {
            Ok(body) => body.data,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode models response");
                Vec::new()
            }
        }
    }

    /// First model whose id looks like an embedding model, else the first
    /// model, else none.
    pub async fn embedding_model(&self) -> Option<String> {
        let models = self.list_models().await;
        for m in &models {
            let lower = m.id.to_lowercase();
            if EMBED_MODEL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                return Some(m.id.clone());
            }
        }
        models.first().map(|m| m.id.clone())
    }

    /// First model that is not an embedding or speech model, else the first
    /// model, else none.
    pub async fn chat_model(&self) -> Option<String> {
        let models = self.list_models().await;
        for m in &models {
            let lower = m.id.to_lowercase();
            if !CHAT_MODEL_EXCLUDE_KEYWORDS
                .iter()
                .any(|kw| lower.contains(kw))
            {
                return Some(m.id.clone());
            }
        }
        models.first().map(|m| m.id.clone())
    }

    /// Loaded context window of the target model, from the server's native
    /// extended endpoint. Resolved once per client; falls back to 4096.
    pub async fn context_length(&self, model: Option<&str>) -> usize {
        *self
            .context_length
            .get_or_init(|| async { self.fetch_context_length(model).await })
            .await
    }

    async fn fetch_context_length(&self, model: Option<&str>) -> usize {
        let url = format!("{}/api/v0/models", self.root_url);
        let resp = match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(_) | Err(_) => {
                tracing::warn!("Failed to query context length, using fallback");
                return DEFAULT_CONTEXT_LENGTH;
            }
        };

        #[derive(Deserialize)]
        struct NativeModels {
            #[serde(default)]
            data: Vec<serde_json::Value>,
        }
        let body: NativeModels = match resp.json().await {
            Ok(body) => body,
            Err(_) => return DEFAULT_CONTEXT_LENGTH,
        };

        let target = match model {
            Some(id) => Some(id.to_string()),
            None => self.chat_model().await,
        };

        if let Some(target) = target {
            for m in &body.data {
                if m.get("id").and_then(|v| v.as_str()) == Some(target.as_str()) {
                    let ctx = context_from_model(m);
                    tracing::info!(model = %target, tokens = ctx, "LM Studio context window");
                    return ctx;
                }
            }
        }
        // Fallback: first LLM-typed model.
        for m in &body.data {
            if m.get("type").and_then(|v| v.as_str()) == Some("llm") {
                return context_from_model(m);
            }
        }
        DEFAULT_CONTEXT_LENGTH
    }

    /// One f64 vector per input text, in order.
    pub async fn embed(&self, texts: &[String], model: Option<&str>) -> Result<Vec<Vec<f64>>> {
        let model = match model {
            Some(m) => m.to_string(),
            None => self.embedding_model().await.ok_or_else(|| {
                RefineryError::LlmUnavailable("no embedding model available".to_string())
            })?,
        };

        let url = format!("{}/embeddings", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({"model": model, "input": texts}))
            .send()
            .await
            .map_err(|e| RefineryError::Llm(format!("embed request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RefineryError::Llm(format!(
                "embed failed (status {status}): {body}"
            )));
        }

        let body: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| RefineryError::Llm(format!("decode embeddings: {e}")))?;
        if body.data.is_empty() {
            return Err(RefineryError::Llm("no embeddings returned".to_string()));
        }
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }

    pub async fn embed_single(&self, text: &str, model: Option<&str>) -> Result<Vec<f64>> {
        let mut vectors = self.embed(&[text.to_string()], model).await?;
        if vectors.is_empty() {
            return Err(RefineryError::Llm("no embedding returned".to_string()));
        }
        Ok(vectors.remove(0))
    }

    /// Chat completion returning the first choice's sanitized content.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String> {
        let model = match model {
            Some(m) => m.to_string(),
            None => self.chat_model().await.ok_or_else(|| {
                RefineryError::LlmUnavailable("no chat model available".to_string())
            })?,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({
                "model": model,
                "messages": messages,
                "temperature": temperature,
                "max_tokens": max_tokens,
            }))
            .send()
            .await
            .map_err(|e| RefineryError::Llm(format!("chat request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RefineryError::Llm(format!(
                "chat failed (status {status}): {body}"
            )));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| RefineryError::Llm(format!("decode chat response: {e}")))?;
        let Some(choice) = body.choices.into_iter().next() else {
            return Ok(String::new());
        };
        Ok(sanitize_response(&choice.message.content))
    }

    /// Annotate a chunk with context-aware truncation. The caller parses the
    /// returned JSON.
    pub async fn annotate_chunk(
        &self,
        chunk_text: &str,
        prompt_template: &str,
        model: Option<&str>,
    ) -> Result<String> {
        let ctx = self.context_length(model).await;
        let max_chunk_chars = ((ctx as i64 - 2000) * 3).max(400) as usize;

        let truncated: String = if chunk_text.chars().count() > max_chunk_chars {
            chunk_text.chars().take(max_chunk_chars).collect()
        } else {
            chunk_text.to_string()
        };

        let messages = [
            ChatMessage::new("system", prompt_template),
            ChatMessage::new("user", &truncated),
        ];
        let raw = self.chat(&messages, model, 0.1, 2048).await?;
        Ok(strip_code_fences(&raw))
    }
}

fn context_from_model(m: &serde_json::Value) -> usize {
    for key in ["loaded_context_length", "max_context_length"] {
        if let Some(v) = m.get(key).and_then(|v| v.as_f64()) {
            if v > 0.0 {
                return v as usize;
            }
        }
    }
    DEFAULT_CONTEXT_LENGTH
}

/// Strip reasoning-model scratch output: everything up to a closing
/// `</think>` tag is dropped, and an unterminated `<think>` body is treated
/// as empty.
pub fn sanitize_response(text: &str) -> String {
    if let Some(idx) = text.find("</think>") {
        text[idx + "</think>".len()..].trim().to_string()
    } else if text.starts_with("<think>") {
        String::new()
    } else {
        text.to_string()
    }
}

/// Remove surrounding triple-backtick fence lines from a response.
pub fn strip_code_fences(raw: &str) -> String {
    let text = raw.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_closed_think_block() {
        let raw = "<think>internal musing</think>\n{\"topics\":[]}";
        assert_eq!(sanitize_response(raw), "{\"topics\":[]}");
    }

    #[test]
    fn test_sanitize_unterminated_think_is_empty() {
        assert_eq!(sanitize_response("<think>never closed"), "");
    }

    #[test]
    fn test_sanitize_passes_plain_text_through() {
        assert_eq!(sanitize_response("hello"), "hello");
    }

    #[test]
    fn test_strip_code_fences() {
        let raw = "```json\n{\"label\": \"x\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"label\": \"x\"}");
    }

    #[test]
    fn test_strip_code_fences_without_fence() {
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_root_url_strips_v1_suffix() {
        let client = LmStudioClient::new("http://127.0.0.1:1234/v1", 10);
        assert_eq!(client.base_url, "http://127.0.0.1:1234/v1");
        assert_eq!(client.root_url, "http://127.0.0.1:1234");
    }
}
