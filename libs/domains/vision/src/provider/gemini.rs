use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{
    GenerationRequest, StreamChunk, TokenStream, TokenStreamProvider, error_from_response,
    sse_data,
};
use crate::error::{VisionError, VisionResult};
use crate::models::{ProviderCapabilities, ProviderKind, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini provider configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// A missing key is not an error here; requests fail with `CONFIG_ERROR` instead.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        }
    }
}

/// Gemini `streamGenerateContent` provider; the only ranking-capable backend
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request_body(request: &GenerationRequest) -> serde_json::Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        parts.extend(request.images.iter().map(|image| {
            json!({
                "inline_data": {
                    "mime_type": image.mime_type(),
                    "data": image.base64_data(),
                }
            })
        }));

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": 0.2 }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

impl GenerateChunk {
    fn texts(self) -> impl Iterator<Item = String> {
        self.candidates
            .into_iter()
            .take(1)
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .filter(|t| !t.is_empty())
    }
}

impl From<UsageMetadata> for TokenUsage {
    fn from(meta: UsageMetadata) -> Self {
        TokenUsage {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
            total_tokens: meta.total_token_count,
        }
    }
}

fn chunk_error(err: ChunkError) -> VisionError {
    match reqwest::StatusCode::from_u16(err.code) {
        Ok(status) => VisionError::from_status(status, err.message),
        Err(_) => VisionError::Provider(err.message),
    }
}

/// Decode Gemini SSE payloads into stream chunks.
fn decode_events<S>(events: S) -> TokenStream
where
    S: futures::Stream<Item = VisionResult<String>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(events);
        let mut usage = None;

        while let Some(data) = events.next().await {
            let data = match data {
                Ok(data) => data,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let mut chunk: GenerateChunk = match serde_json::from_str(&data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable Gemini event");
                    continue;
                }
            };
            if let Some(err) = chunk.error.take() {
                yield Err(chunk_error(err));
                return;
            }
            if let Some(meta) = chunk.usage_metadata.take() {
                usage = Some(TokenUsage::from(meta));
            }
            for text in chunk.texts() {
                yield Ok(StreamChunk::Text(text));
            }
        }

        if let Some(usage) = usage {
            yield Ok(StreamChunk::Usage(usage));
        }
    })
}

#[async_trait]
impl TokenStreamProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { ranking: true }
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn ensure_configured(&self) -> VisionResult<()> {
        match self.config.api_key {
            Some(_) => Ok(()),
            None => Err(VisionError::Config("GEMINI_API_KEY is not set".to_string())),
        }
    }

    async fn stream(&self, request: GenerationRequest) -> VisionResult<TokenStream> {
        self.ensure_configured()?;
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let response = self
            .client
            .post(format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.config.base_url, self.config.model
            ))
            .header("x-goog-api-key", api_key)
            .json(&Self::request_body(&request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match error_from_response(response).await {
                // Gemini reports a bad key as 400 INVALID_ARGUMENT.
                VisionError::Provider(msg) if msg.contains("API key") => {
                    VisionError::ProviderAuth(msg)
                }
                err => err,
            });
        }

        Ok(decode_events(sse_data(response.bytes_stream())))
    }
}
