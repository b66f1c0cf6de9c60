//! Azure OpenAI provider.
//!
//! Azure routes by deployment name rather than model name, and
//! authenticates with an `api-key` header instead of a bearer token.
//! Chat completions are requested with `stream: true` and decoded from
//! the server-sent-event wire format incrementally, so the first token
//! reaches the caller before the last one is generated.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use serde_json::{Value, json};

use refdesk_core::config::AzureOpenAiConfig;
use refdesk_core::error::{RefdeskError, Result};
use refdesk_core::traits::{Embedder, Generator, TokenStream};

pub struct AzureOpenAi {
    endpoint: String,
    api_key: String,
    api_version: String,
    embeddings_deployment: String,
    chat_deployment: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl AzureOpenAi {
    pub fn new(config: &AzureOpenAiConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(RefdeskError::Config(
                "azure_openai.endpoint is empty and AZURE_OPENAI_ENDPOINT is not set".into(),
            ));
        }
        if config.api_key.is_empty() {
            return Err(RefdeskError::Config(
                "azure_openai.api_key is empty and AZURE_OPENAI_API_KEY is not set".into(),
            ));
        }
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            embeddings_deployment: config.embeddings_deployment.clone(),
            chat_deployment: config.chat_deployment.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::new(),
        })
    }

    fn deployment_url(&self, deployment: &str, path: &str) -> String {
        format!(
            "{}/openai/deployments/{deployment}/{path}?api-version={}",
            self.endpoint, self.api_version
        )
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(url)
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| RefdeskError::Http(format!("azure request failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RefdeskError::Provider(format!(
                "azure API error {status}: {text}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Embedder for AzureOpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RefdeskError::Validation(
                "cannot embed an empty question".into(),
            ));
        }

        let url = self.deployment_url(&self.embeddings_deployment, "embeddings");
        let body = json!({ "input": [text] });
        let resp = self.post(&url, &body).await?;

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| RefdeskError::Http(e.to_string()))?;
        let embedding = payload["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| RefdeskError::Provider("no embedding in response".into()))?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| RefdeskError::Provider("non-numeric embedding element".into()))?;

        tracing::debug!(dim = embedding.len(), "embedded question");
        Ok(embedding)
    }
}

#[async_trait]
impl Generator for AzureOpenAi {
    async fn stream_chat(&self, system: &str, user: &str) -> Result<TokenStream> {
        let url = self.deployment_url(&self.chat_deployment, "chat/completions");
        let body = json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        let resp = self.post(&url, &body).await?;

        // Chunks arrive at arbitrary byte boundaries; buffer until a
        // full SSE line is available, then decode token deltas.
        let tokens = resp
            .bytes_stream()
            .map_err(|e| RefdeskError::Http(format!("stream interrupted: {e}")))
            .scan((String::new(), false), |(buffer, done), chunk| {
                let out: Vec<Result<String>> = match chunk {
                    Err(e) => vec![Err(e)],
                    Ok(_) if *done => vec![],
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        let mut tokens = Vec::new();
                        for event in drain_sse_lines(buffer) {
                            match event {
                                SseEvent::Token(token) => tokens.push(Ok(token)),
                                SseEvent::Done => {
                                    *done = true;
                                    break;
                                }
                                SseEvent::Skip => {}
                            }
                        }
                        tokens
                    }
                };
                futures::future::ready(Some(out))
            })
            .flat_map(stream::iter);

        Ok(Box::pin(tokens))
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Token(String),
    Done,
    Skip,
}

/// Remove every complete line from the buffer and decode each one,
/// leaving any trailing partial line in place.
fn drain_sse_lines(buffer: &mut String) -> Vec<SseEvent> {
    let mut events = Vec::new();
    while let Some(newline) = buffer.find('\n') {
        let line: String = buffer.drain(..=newline).collect();
        events.push(parse_sse_line(line.trim_end()));
    }
    events
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    let Ok(payload) = serde_json::from_str::<Value>(data) else {
        tracing::warn!("discarding undecodable stream event");
        return SseEvent::Skip;
    };
    match payload["choices"][0]["delta"]["content"].as_str() {
        // Role-only and filter-only events carry no content.
        Some(token) => SseEvent::Token(token.to_string()),
        None => SseEvent::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"こんにちは"}}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Token("こんにちは".into()));
    }

    #[test]
    fn test_parse_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
    }

    #[test]
    fn test_role_only_delta_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Skip);
    }

    #[test]
    fn test_non_data_lines_are_skipped() {
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
    }

    #[test]
    fn test_garbage_payload_is_skipped_not_fatal() {
        assert_eq!(parse_sse_line("data: {not json"), SseEvent::Skip);
    }

    #[test]
    fn test_drain_keeps_partial_trailing_line() {
        let mut buffer = String::from(
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\ndata: {\"choi",
        );
        let events = drain_sse_lines(&mut buffer);
        assert_eq!(events, vec![SseEvent::Token("A".into())]);
        assert_eq!(buffer, "data: {\"choi");
    }

    #[test]
    fn test_drain_handles_crlf_lines() {
        let mut buffer = String::from("data: [DONE]\r\n");
        let events = drain_sse_lines(&mut buffer);
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(buffer.is_empty());
    }
}
