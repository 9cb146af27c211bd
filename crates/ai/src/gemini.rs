//! Gemini `generateContent` client for text and image generation.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::generator::{ImageGenerator, Prompt, TextGenerator};
use crate::result::{GeneratedImage, GeneratedText, GenerationError, TokenUsage};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub base_url: String,
    /// Per-request timeout enforced by the HTTP client.
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Gemini REST client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    #[instrument(skip(self, body), fields(model = %model))]
    async fn call(&self, model: &str, body: &GenerateContentRequest) -> Result<GenerateContentResponse, GenerationError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("Gemini request timed out");
                    GenerationError::Timeout
                } else {
                    error!(error = ?e, "Failed to send request to Gemini");
                    GenerationError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, body = %message, "Gemini returned error");
            return Err(classify_status(status, message));
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::Malformed(format!("response body: {e}"))
            }
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<GeneratedText, GenerationError> {
        debug!(purpose = %prompt.purpose, "Generating text");
        let body = GenerateContentRequest::text(&prompt.text, None);
        let response = self.call(&self.config.text_model, &body).await?;
        text_from_response(response)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(&self, prompt: &Prompt) -> Result<GeneratedImage, GenerationError> {
        debug!(purpose = %prompt.purpose, "Generating image");
        let body = GenerateContentRequest::text(
            &prompt.text,
            Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            }),
        );
        let response = self.call(&self.config.image_model, &body).await?;
        image_from_response(response)
    }
}

fn classify_status(status: StatusCode, message: String) -> GenerationError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GenerationError::Quota(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GenerationError::Timeout,
        _ => GenerationError::Provider {
            status: status.as_u16(),
            message,
        },
    }
}

// Wire types.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    fn text(text: &str, generation_config: Option<GenerationConfig>) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(text.to_string()),
                    inline_data: None,
                }],
            }],
            generation_config,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

fn first_parts(response: &GenerateContentResponse) -> Result<&[Part], GenerationError> {
    response
        .candidates
        .first()
        .map(|c| c.content.parts.as_slice())
        .ok_or_else(|| GenerationError::Malformed("no candidates in response".to_string()))
}

fn text_from_response(response: GenerateContentResponse) -> Result<GeneratedText, GenerationError> {
    let content: String = first_parts(&response)?
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    if content.trim().is_empty() {
        return Err(GenerationError::Malformed("response contained no text".to_string()));
    }

    let text = GeneratedText::new(content);
    Ok(match response.usage_metadata {
        Some(usage) => text.with_usage(TokenUsage {
            prompt_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        }),
        None => text,
    })
}

fn image_from_response(response: GenerateContentResponse) -> Result<GeneratedImage, GenerationError> {
    let inline = first_parts(&response)?
        .iter()
        .find_map(|p| p.inline_data.as_ref())
        .ok_or_else(|| GenerationError::Malformed("response contained no image".to_string()))?;

    let data = STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| GenerationError::Malformed(format!("image data is not base64: {e}")))?;

    Ok(GeneratedImage::Bytes {
        mime_type: inline.mime_type.clone(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn text_parts_are_joined_with_usage() {
        let response = parse(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "there"}]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3}
        }));

        let text = text_from_response(response).unwrap();
        assert_eq!(text.content, "Hello there");
        assert_eq!(text.usage, Some(TokenUsage { prompt_tokens: 12, output_tokens: 3 }));
    }

    #[test]
    fn empty_candidates_are_malformed() {
        let err = text_from_response(parse(serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn inline_image_is_decoded() {
        let response = parse(serde_json::json!({
            "candidates": [{"content": {"parts": [
                {"text": "here you go"},
                {"inlineData": {"mimeType": "image/png", "data": STANDARD.encode([1u8, 2, 3])}}
            ]}}]
        }));

        let image = image_from_response(response).unwrap();
        assert_eq!(
            image,
            GeneratedImage::Bytes { mime_type: "image/png".into(), data: vec![1, 2, 3] }
        );
    }

    #[test]
    fn text_only_image_response_is_malformed() {
        let response = parse(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "I cannot draw that"}]}}]
        }));
        assert!(matches!(image_from_response(response), Err(GenerationError::Malformed(_))));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            GenerationError::Quota(_)
        ));
        assert_eq!(classify_status(StatusCode::GATEWAY_TIMEOUT, String::new()), GenerationError::Timeout);
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad".into()),
            GenerationError::Provider { status: 400, .. }
        ));
    }

    #[test]
    fn endpoint_includes_model() {
        let mut config = GeminiConfig::new("key");
        config.base_url = "http://localhost:9/v1beta/".into();
        let client = GeminiClient::new(config).unwrap();
        assert_eq!(
            client.endpoint("m1"),
            "http://localhost:9/v1beta/models/m1:generateContent"
        );
    }
}
