//! Generation worker: turns one claimed request into a persisted artifact.
//!
//! Every external call is optional in the sense that its failure degrades to a
//! fallback value. Only a payload without usable input, or a failure to persist
//! the artifact, fails the request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{info, instrument, warn};

use celestia_ai::{GeneratedImage, GenerationError, ImageGenerator, Prompt, TextGenerator, prompt};
use celestia_core::{ArtifactId, SharedClock};
use celestia_readings::{
    AstrologyProfile, GeneratedArtifact, GenerationPayload, GenerationRequest, ImageRef,
    ReleasePolicy,
};

use crate::artifacts::ArtifactStore;
use crate::cache::ReadingService;
use crate::error::StoreError;
use crate::storage::ObjectStorage;

pub const DEFAULT_FALLBACK_IMAGE_TEMPLATE: &str = "https://api.dicebear.com/7.x/{style}/png?seed={seed}&size=512&radius=40&backgroundType=gradientLinear";

const FALLBACK_REPORT: &str = "Your soulmate reading is being refined by our astrologers. \
     Check back soon for the full interpretation.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The stored payload cannot drive generation at all.
    #[error("input incomplete: {0}")]
    InputIncomplete(String),

    /// The artifact could not be persisted.
    #[error("failed to persist artifact: {0}")]
    Persistence(#[from] StoreError),
}

/// Worker settings derived from configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub release_policy: ReleasePolicy,
    /// Per external call.
    pub generation_timeout: Duration,
    /// Placeholder URL template with `{style}` and `{seed}`.
    pub fallback_image_template: String,
    /// Whether new artifacts are scheduled for a "ready" notification.
    pub notifications_enabled: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            release_policy: ReleasePolicy::default(),
            generation_timeout: Duration::from_secs(120),
            fallback_image_template: DEFAULT_FALLBACK_IMAGE_TEMPLATE.to_string(),
            notifications_enabled: true,
        }
    }
}

pub struct GenerationWorker {
    text: Arc<dyn TextGenerator>,
    image: Arc<dyn ImageGenerator>,
    artifacts: Arc<dyn ArtifactStore>,
    storage: Option<Arc<dyn ObjectStorage>>,
    readings: Option<Arc<ReadingService>>,
    clock: SharedClock,
    settings: WorkerSettings,
}

impl GenerationWorker {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        image: Arc<dyn ImageGenerator>,
        artifacts: Arc<dyn ArtifactStore>,
        clock: SharedClock,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            text,
            image,
            artifacts,
            storage: None,
            readings: None,
            clock,
            settings,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Warm the reading cache after each completed request.
    pub fn with_readings(mut self, readings: Arc<ReadingService>) -> Self {
        self.readings = Some(readings);
        self
    }

    /// Produce and persist the artifact for a claimed request.
    #[instrument(skip(self, request), fields(request_id = %request.id, owner = %request.owner_id))]
    pub async fn process(&self, request: &GenerationRequest) -> Result<ArtifactId, WorkerError> {
        request
            .payload
            .ensure_usable()
            .map_err(|e| WorkerError::InputIncomplete(e.to_string()))?;

        let astrology = AstrologyProfile::derive(&request.payload.birth_details);

        let image = self.portrait(request, &astrology).await;
        let report = self
            .optional_text(prompt::report(&request.payload, &astrology))
            .await
            .unwrap_or_else(|| FALLBACK_REPORT.to_string());
        let natal_chart = self.optional_text(prompt::natal_chart(&astrology)).await;

        let generated_at = self.clock.now();
        let artifact = GeneratedArtifact {
            id: ArtifactId::new(),
            owner_id: request.owner_id.clone(),
            request_id: request.id,
            image,
            report,
            natal_chart,
            astrology,
            schedule: self
                .settings
                .release_policy
                .schedule_for(generated_at, self.settings.notifications_enabled),
        };

        self.artifacts.insert(&artifact).await?;
        info!(
            artifact_id = %artifact.id,
            release_at = %artifact.schedule.release_at,
            placeholder_image = artifact.image.is_placeholder(),
            "artifact persisted"
        );

        if let Some(readings) = &self.readings {
            readings.warm(&artifact.owner_id, &artifact.astrology).await;
        }

        Ok(artifact.id)
    }

    async fn portrait(&self, request: &GenerationRequest, astrology: &AstrologyProfile) -> ImageRef {
        let generated = self
            .timed(self.image.generate_image(&prompt::portrait(&request.payload, astrology)))
            .await;

        match generated {
            Ok(GeneratedImage::Url(url)) => ImageRef::Url { url },
            Ok(GeneratedImage::Bytes { mime_type, data }) => self.store_image(request, mime_type, data).await,
            Err(e) => {
                warn!(error = %e, "image generation failed; using placeholder");
                ImageRef::Placeholder {
                    url: fallback_image_url(&self.settings.fallback_image_template, &request.payload),
                }
            }
        }
    }

    async fn store_image(&self, request: &GenerationRequest, mime_type: String, data: Vec<u8>) -> ImageRef {
        if let Some(storage) = &self.storage {
            let key = format!("sketch-{}.png", request.id);
            match storage.upload(&key, &data, &mime_type).await {
                Ok(url) => return ImageRef::Url { url },
                Err(e) => warn!(error = %e, key = %key, "image upload failed; keeping image inline"),
            }
        }
        ImageRef::Inline {
            mime_type,
            data_base64: STANDARD.encode(&data),
        }
    }

    /// Generated text, or `None` when the call fails or returns nothing.
    async fn optional_text(&self, request: Prompt) -> Option<String> {
        match self.timed(self.text.generate(&request)).await {
            Ok(text) if !text.content.trim().is_empty() => Some(text.content.trim().to_string()),
            Ok(_) => {
                warn!(purpose = %request.purpose, "empty text generated; using fallback");
                None
            }
            Err(e) => {
                warn!(purpose = %request.purpose, error = %e, "text generation failed; using fallback");
                None
            }
        }
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, GenerationError>>,
    ) -> Result<T, GenerationError> {
        tokio::time::timeout(self.settings.generation_timeout, call)
            .await
            .unwrap_or(Err(GenerationError::Timeout))
    }
}

/// Placeholder URL for a failed portrait. The style follows the portrayed gender.
pub fn fallback_image_url(template: &str, payload: &GenerationPayload) -> String {
    let subject = prompt::portrait_subject(payload).to_ascii_lowercase();
    let style = if matches!(subject.as_str(), "female" | "woman") {
        "adventurer-neutral"
    } else {
        "adventurer"
    };
    template.replace("{style}", style).replace("{seed}", "soulmate")
}
