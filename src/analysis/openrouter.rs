//! OpenRouter-compatible chat-completions client.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::VisionModel;
use crate::config::AnalysisConfig;

pub struct OpenRouterVision {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    http_referer: Option<String>,
    x_title: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
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

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenRouterVision {
    pub fn new(config: &AnalysisConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            http_referer: config.http_referer.clone(),
            x_title: config.x_title.clone(),
        })
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        if let Some(ref referer) = self.http_referer {
            req = req.header("HTTP-Referer", referer);
        }
        if let Some(ref title) = self.x_title {
            req = req.header("X-Title", title);
        }
        req
    }

    fn request_body(&self, prompt: &str, image: &[u8], content_type: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(image, content_type),
                        },
                    },
                ],
            }],
        }
    }
}

/// `data:<content-type>;base64,<payload>`
pub fn data_url(image: &[u8], content_type: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(image);
    format!("data:{content_type};base64,{encoded}")
}

#[async_trait]
impl VisionModel for OpenRouterVision {
    async fn complete(
        &self,
        prompt: &str,
        image: &[u8],
        content_type: &str,
    ) -> Result<String, String> {
        let body = self.request_body(prompt, image, content_type);

        let response = self
            .build_request("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Analysis request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("Analysis API returned {status}: {text}"));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse analysis response: {e}"))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| "Analysis response has no content".to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
