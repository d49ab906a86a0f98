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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DONE_MARKER: &str = "[DONE]";

/// OpenAI provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl OpenAiConfig {
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

    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        }
    }
}

/// OpenAI chat-completions provider. Recognition only.
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut content = vec![json!({ "type": "text", "text": request.prompt })];
        content.extend(request.images.iter().map(|image| {
            json!({
                "type": "image_url",
                "image_url": { "url": image.data_url() }
            })
        }));

        json!({
            "model": self.config.model,
            "stream": true,
            "stream_options": { "include_usage": true },
            "temperature": 0.2,
            "messages": [{ "role": "user", "content": content }]
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

fn decode_events<S>(events: S) -> TokenStream
where
    S: futures::Stream<Item = VisionResult<String>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut events = Box::pin(events);

        while let Some(data) = events.next().await {
            let data = match data {
                Ok(data) => data,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            if data == DONE_MARKER {
                break;
            }
            let chunk: CompletionChunk = match serde_json::from_str(&data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable OpenAI event");
                    continue;
                }
            };
            for text in chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.and_then(|d| d.content))
                .filter(|t| !t.is_empty())
            {
                yield Ok(StreamChunk::Text(text));
            }
            // Only the final chunk carries usage when include_usage is set.
            if let Some(usage) = chunk.usage {
                yield Ok(StreamChunk::Usage(TokenUsage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                }));
            }
        }
    })
}

#[async_trait]
impl TokenStreamProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { ranking: false }
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn ensure_configured(&self) -> VisionResult<()> {
        match self.config.api_key {
            Some(_) => Ok(()),
            None => Err(VisionError::Config("OPENAI_API_KEY is not set".to_string())),
        }
    }

    async fn stream(&self, request: GenerationRequest) -> VisionResult<TokenStream> {
        self.ensure_configured()?;
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
            .json(&self.request_body(&request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(decode_events(sse_data(response.bytes_stream())))
    }
}
