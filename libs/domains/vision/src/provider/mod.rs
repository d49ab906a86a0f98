//! Token-stream providers.
//!
//! A provider turns a prompt plus image attachments into a stream of text
//! fragments followed by a usage record. Which features a backend supports is
//! exposed through [`ProviderCapabilities`] rather than by name.

mod gemini;
mod openai;

pub use gemini::{GeminiConfig, GeminiProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{VisionError, VisionResult};
use crate::models::{ImagePayload, ProviderCapabilities, ProviderKind, TokenUsage};

/// One element of a provider stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    Usage(TokenUsage),
}

pub type TokenStream = Pin<Box<dyn Stream<Item = VisionResult<StreamChunk>> + Send>>;

/// Prompt and attachments for one generation
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub images: Vec<ImagePayload>,
}

/// Trait for generative vision backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStreamProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> ProviderCapabilities;

    fn model(&self) -> &str;

    /// Fails with `VisionError::Config` when credentials are missing
    fn ensure_configured(&self) -> VisionResult<()>;

    /// Start a generation and return its fragment stream
    async fn stream(&self, request: GenerationRequest) -> VisionResult<TokenStream>;
}

/// Build the provider selected by `kind` from environment variables
pub fn provider_from_env(kind: ProviderKind) -> Arc<dyn TokenStreamProvider> {
    match kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(GeminiConfig::from_env())),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(OpenAiConfig::from_env())),
    }
}

/// Split a server-sent-events byte stream into its `data:` payloads.
pub(crate) fn sse_data<S, B>(bytes: S) -> impl Stream<Item = VisionResult<String>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut pending: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(VisionError::from(e));
                    return;
                }
            };
            pending.extend_from_slice(chunk.as_ref());

            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                if let Some(data) = data_payload(&line) {
                    yield Ok(data);
                }
            }
        }

        if let Some(data) = data_payload(&pending) {
            yield Ok(data);
        }
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix("data:")
        .map(|data| data.trim_start().to_string())
        .filter(|data| !data.is_empty())
}

/// Read an error body, preferring the provider's `error.message` field
pub(crate) async fn error_from_response(response: reqwest::Response) -> VisionError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    VisionError::from_status(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn collect(chunks: Vec<&'static str>) -> Vec<String> {
        let bytes = stream::iter(chunks.into_iter().map(Ok::<_, reqwest::Error>));
        sse_data(bytes)
            .map(|r| r.unwrap())
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn test_sse_payloads_split_across_chunks() {
        let out = collect(vec![
            "data: {\"a\":",
            "1}\r\n\r\nevent: ping\n",
            ": keep-alive\ndata: {\"b\":2}\n\ndata: [DONE]",
        ])
        .await;
        assert_eq!(out, vec!["{\"a\":1}", "{\"b\":2}", "[DONE]"]);
    }

    #[tokio::test]
    async fn test_sse_ignores_empty_data() {
        let out = collect(vec!["data:\n", "data: x\n"]).await;
        assert_eq!(out, vec!["x"]);
    }
}
