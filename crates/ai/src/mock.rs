//! Deterministic generator used in mock mode and in tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::generator::{ImageGenerator, Prompt, TextGenerator};
use crate::result::{GeneratedImage, GeneratedText, GenerationError};

/// PNG signature followed by an empty IHDR marker. Enough for content sniffing.
const MOCK_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d, b'I', b'H', b'D', b'R'];

/// Generator that never leaves the process.
///
/// Text for reading prompts is a JSON object with guidance and scores, so the
/// score-parsing path is exercised the same way as with a live model.
#[derive(Debug, Default)]
pub struct MockGenerator {
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
    text_failure: Mutex<Option<GenerationError>>,
    image_failure: Mutex<Option<GenerationError>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent text call fails with `error`.
    pub fn fail_text_with(self, error: GenerationError) -> Self {
        self.set_text_failure(Some(error));
        self
    }

    /// Every subsequent image call fails with `error`.
    pub fn fail_images_with(self, error: GenerationError) -> Self {
        self.set_image_failure(Some(error));
        self
    }

    pub fn set_text_failure(&self, error: Option<GenerationError>) {
        *self.text_failure.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    pub fn set_image_failure(&self, error: Option<GenerationError>) {
        *self.image_failure.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    fn mock_text(prompt: &Prompt, call: usize) -> String {
        match prompt.purpose.as_str() {
            "daily" | "tomorrow" | "monthly" => {
                // Vary scores a little between calls so regenerated readings differ.
                let emotion = 60 + (call % 30);
                let energy = 45 + (call * 7 % 40);
                serde_json::json!({
                    "guidance": format!("A steady {} for matters of the heart.", prompt.purpose),
                    "emotionScore": emotion,
                    "energyScore": energy,
                })
                .to_string()
            }
            "natal_chart" => "Personality: grounded.\nLove: loyal.\nCareer: patient.\nGrowth: openness.".to_string(),
            other => format!("Mock {other} text #{call}."),
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<GeneratedText, GenerationError> {
        let call = self.text_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = self.text_failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }
        Ok(GeneratedText::new(Self::mock_text(prompt, call)))
    }
}

#[async_trait]
impl ImageGenerator for MockGenerator {
    async fn generate_image(&self, _prompt: &Prompt) -> Result<GeneratedImage, GenerationError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.image_failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }
        Ok(GeneratedImage::Bytes {
            mime_type: "image/png".to_string(),
            data: MOCK_PNG.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reading_text_is_json_with_scores() {
        let mock = MockGenerator::new();
        let text = mock.generate(&Prompt::new("daily", "...")).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text.content).unwrap();

        assert!(value["guidance"].as_str().unwrap().contains("daily"));
        assert!(value["emotionScore"].as_u64().unwrap() <= 100);
        assert!(value["energyScore"].as_u64().unwrap() <= 100);
        assert_eq!(mock.text_calls(), 1);
    }

    #[tokio::test]
    async fn configured_failures_are_returned_and_counted() {
        let mock = MockGenerator::new().fail_images_with(GenerationError::Timeout);

        let err = mock.generate_image(&Prompt::new("portrait", "...")).await.unwrap_err();
        assert_eq!(err, GenerationError::Timeout);
        assert_eq!(mock.image_calls(), 1);

        mock.set_image_failure(None);
        let image = mock.generate_image(&Prompt::new("portrait", "...")).await.unwrap();
        assert!(matches!(image, GeneratedImage::Bytes { ref mime_type, .. } if mime_type == "image/png"));
    }
}
