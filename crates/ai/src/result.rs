use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token accounting reported by the provider, when available.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub output_tokens: u32,
}

/// Text produced by a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

impl GeneratedText {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Image produced by a generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    /// Provider-hosted image.
    Url(String),
    /// Raw image bytes.
    Bytes { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation timed out")]
    Timeout,

    #[error("provider quota exhausted: {0}")]
    Quota(String),

    #[error("malformed provider output: {0}")]
    Malformed(String),

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned status {status}: {message}")]
    Provider { status: u16, message: String },
}
