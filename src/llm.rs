use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;

/// The single user block of an inference request.
#[derive(Debug, Clone, PartialEq)]
pub enum UserContent {
    Text(String),
    /// An inline `data:` URL plus the instruction that goes with it.
    Image { data_url: String, instruction: String },
}

/// System instruction plus one user block. Built fresh for every event.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub system: String,
    pub content: UserContent,
}

impl InferenceRequest {
    pub fn text(system: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            content: UserContent::Text(text.into()),
        }
    }

    pub fn image(system: impl Into<String>, instruction: impl Into<String>, image: &[u8]) -> Self {
        Self {
            system: system.into(),
            content: UserContent::Image {
                data_url: image_data_url(image),
                instruction: instruction.into(),
            },
        }
    }
}

/// Telegram re-encodes every photo as JPEG.
pub fn image_data_url(image: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(image)
    )
}

/// A text/vision completion provider.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl From<&UserContent> for MessageContent {
    fn from(content: &UserContent) -> Self {
        match content {
            UserContent::Text(text) => MessageContent::Text(text.clone()),
            UserContent::Image {
                data_url,
                instruction,
            } => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: instruction.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url.clone(),
                    },
                },
            ]),
        }
    }
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn build_request(&self, request: &InferenceRequest) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(request.system.clone()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::from(&request.content),
                },
            ],
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait]
impl InferenceService for LlmClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.config.effective_base_url());

        debug!("Sending request to {} ({}): {}", self.config.provider, self.config.model, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.config.provider))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error ({}): {}", self.config.provider, status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.config.provider))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .with_context(|| format!("No response content from {}", self.config.provider))
    }
}
