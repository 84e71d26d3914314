//! Multimodal AI client. Its job ends at "valid JSON or text back from the
//! wire" -- schema coercion into a verdict lives in `context::parse_verdict`,
//! keeping the network I/O separate from decision logic.

use crate::errors::{AppError, AppResult};
use base64::Engine as _;
use reqwest::Client;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: u32 = 2;

#[derive(Clone)]
pub struct AiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Sends `prompt` plus any chart images (raw PNG bytes, base64-encoded
    /// inline) to the model and returns its raw text response. Transient
    /// failures (network, 5xx) retry up to `MAX_RETRIES` times; 4xx is
    /// terminal.
    pub async fn analyze(&self, prompt: &str, images: &[Vec<u8>], model: &str) -> AppResult<String> {
        let url = format!("{}/messages", self.base_url);
        let content = build_content(prompt, images);

        let body = serde_json::json!({
            "model": model,
            "max_tokens": 4096,
            "messages": [{ "role": "user", "content": content }],
        });

        let mut consecutive_errors = 0u32;
        loop {
            let resp = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(AppError::Validation(format!("AI request rejected: HTTP {status}: {body}")));
                    }
                    if status.is_server_error() {
                        consecutive_errors += 1;
                        if consecutive_errors > MAX_RETRIES {
                            return Err(AppError::Transient(format!("AI provider HTTP {status}")));
                        }
                        tokio::time::sleep(Duration::from_secs(consecutive_errors as u64 * 2)).await;
                        continue;
                    }

                    let parsed: serde_json::Value = resp.json().await?;
                    return extract_text(&parsed);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors > MAX_RETRIES {
                        return Err(AppError::Transient(format!("AI request failed: {e}")));
                    }
                    tokio::time::sleep(Duration::from_secs(consecutive_errors as u64 * 2)).await;
                }
            }
        }
    }
}

fn build_content(prompt: &str, images: &[Vec<u8>]) -> serde_json::Value {
    let mut parts = vec![serde_json::json!({ "type": "text", "text": prompt })];
    for img in images {
        let b64 = base64::engine::general_purpose::STANDARD.encode(img);
        parts.push(serde_json::json!({
            "type": "image",
            "source": { "type": "base64", "media_type": "image/png", "data": b64 },
        }));
    }
    serde_json::Value::Array(parts)
}

fn extract_text(parsed: &serde_json::Value) -> AppResult<String> {
    parsed
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|block| block.get("text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AppError::ParseError("AI response missing text content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_reads_first_content_block() {
        let raw = serde_json::json!({ "content": [{ "type": "text", "text": "hello" }] });
        assert_eq!(extract_text(&raw).unwrap(), "hello");
    }

    #[test]
    fn extract_text_fails_on_missing_content() {
        let raw = serde_json::json!({ "other": true });
        assert!(extract_text(&raw).is_err());
    }

    #[test]
    fn build_content_includes_one_image_part_per_chart() {
        let content = build_content("prompt", &[vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(content.as_array().unwrap().len(), 3);
    }
}
