use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::result::{GeneratedImage, GeneratedText, GenerationError};

/// A single instruction sent to a generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Short label for logs and metrics (e.g. `"portrait"`, `"daily"`).
    pub purpose: String,
    pub text: String,
}

impl Prompt {
    pub fn new(purpose: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            text: text.into(),
        }
    }
}

/// Text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, prompt: &Prompt) -> Result<GeneratedText, GenerationError>;
}

/// Image-generation collaborator.
#[async_trait]
pub trait ImageGenerator: Send + Sync + 'static {
    async fn generate_image(&self, prompt: &Prompt) -> Result<GeneratedImage, GenerationError>;
}
