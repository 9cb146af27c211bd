//! Reading service: cache lookup, roll-forward reuse and generation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use celestia_ai::{GenerationError, TextGenerator, prompt};
use celestia_core::{DomainError, OwnerId, SharedClock};
use celestia_readings::{AstrologyProfile, CachedReading, PeriodKey, ReadingKind, ReadingScores};

use super::store::ReadingCache;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadingError {
    /// Generation failed; nothing was cached.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// How a reading was obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadingSource {
    Cache,
    /// Yesterday's "tomorrow" entry reused as today's "daily".
    RolledForward,
    Generated,
}

pub struct ReadingService {
    cache: Arc<dyn ReadingCache>,
    generator: Arc<dyn TextGenerator>,
    clock: SharedClock,
    timeout: Duration,
}

impl ReadingService {
    pub fn new(
        cache: Arc<dyn ReadingCache>,
        generator: Arc<dyn TextGenerator>,
        clock: SharedClock,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            generator,
            clock,
            timeout,
        }
    }

    /// Reading of `kind` for the current period.
    pub async fn get_or_generate(
        &self,
        owner: &OwnerId,
        kind: ReadingKind,
        astrology: &AstrologyProfile,
    ) -> Result<CachedReading, ReadingError> {
        self.resolve(owner, kind, astrology).await.map(|(reading, _)| reading)
    }

    #[instrument(skip(self, astrology), fields(owner = %owner, kind = %kind))]
    pub async fn resolve(
        &self,
        owner: &OwnerId,
        kind: ReadingKind,
        astrology: &AstrologyProfile,
    ) -> Result<(CachedReading, ReadingSource), ReadingError> {
        let period = kind.period_for(self.clock.today())?;

        if let Some(hit) = self.cache.get(owner, kind, &period).await? {
            debug!(period = %period, "reading cache hit");
            return Ok((hit, ReadingSource::Cache));
        }

        if kind == ReadingKind::Daily {
            if let Some(tomorrow) = self.cache.get(owner, ReadingKind::Tomorrow, &period).await? {
                let daily = tomorrow.rolled_forward(self.clock.now())?;
                self.cache.put(&daily).await?;
                info!(period = %period, "rolled tomorrow reading forward to daily");
                return Ok((daily, ReadingSource::RolledForward));
            }
        }

        let reading = self.generate(owner, kind, period, astrology).await?;
        self.cache.put(&reading).await?;
        Ok((reading, ReadingSource::Generated))
    }

    /// Generate afresh and overwrite the current period entry.
    #[instrument(skip(self, astrology), fields(owner = %owner, kind = %kind))]
    pub async fn regenerate(
        &self,
        owner: &OwnerId,
        kind: ReadingKind,
        astrology: &AstrologyProfile,
    ) -> Result<CachedReading, ReadingError> {
        let period = kind.period_for(self.clock.today())?;
        let reading = self.generate(owner, kind, period, astrology).await?;
        self.cache.put(&reading).await?;
        Ok(reading)
    }

    /// Fill daily, tomorrow and monthly for `owner`. Failures are logged only.
    pub async fn warm(&self, owner: &OwnerId, astrology: &AstrologyProfile) {
        for kind in ReadingKind::ALL {
            if let Err(e) = self.get_or_generate(owner, kind, astrology).await {
                warn!(owner = %owner, kind = %kind, error = %e, "failed to warm reading cache");
            }
        }
    }

    async fn generate(
        &self,
        owner: &OwnerId,
        kind: ReadingKind,
        period: PeriodKey,
        astrology: &AstrologyProfile,
    ) -> Result<CachedReading, ReadingError> {
        let prompt = prompt::reading(kind, &period, astrology);
        let text = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| GenerationError::Timeout)??;

        let (content, scores) = parse_reading(&text.content);
        if content.is_empty() {
            return Err(GenerationError::Malformed("empty reading".to_string()).into());
        }
        debug!(period = %period, usage = ?text.usage, "reading generated");

        Ok(CachedReading {
            owner_id: owner.clone(),
            kind,
            period_key: period,
            content,
            scores,
            created_at: self.clock.now(),
        })
    }
}

/// Split generated text into content and scores.
///
/// Accepts a JSON object `{"guidance", "emotionScore", "energyScore"}`,
/// optionally wrapped in a Markdown code fence. Anything else is kept as
/// plain text without scores.
pub fn parse_reading(raw: &str) -> (String, ReadingScores) {
    let trimmed = strip_code_fence(raw.trim());
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return (raw.trim().to_string(), ReadingScores::default());
    };

    let score = |key: &str| {
        map.get(key)
            .and_then(serde_json::Value::as_f64)
            .filter(|v| v.is_finite())
            .map(|v| v.round().clamp(0.0, 100.0) as u8)
    };
    let scores = ReadingScores {
        emotion: score("emotionScore"),
        energy: score("energyScore"),
    };

    match map.get("guidance").and_then(serde_json::Value::as_str) {
        Some(guidance) => (guidance.trim().to_string(), scores),
        None => (raw.trim().to_string(), scores),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryReadingCache;
    use celestia_ai::MockGenerator;
    use celestia_core::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use proptest::prelude::*;

    fn owner() -> OwnerId {
        OwnerId::parse("reader@example.com").unwrap()
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        cache: Arc<InMemoryReadingCache>,
        generator: Arc<MockGenerator>,
        service: ReadingService,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::arc(Utc.with_ymd_and_hms(2024, 3, 8, 20, 0, 0).unwrap());
        let cache = InMemoryReadingCache::arc();
        let generator = Arc::new(MockGenerator::new());
        let service = ReadingService::new(
            cache.clone(),
            generator.clone(),
            clock.clone(),
            Duration::from_secs(5),
        );
        Fixture {
            clock,
            cache,
            generator,
            service,
        }
    }

    #[tokio::test]
    async fn second_lookup_hits_cache() {
        let f = fixture();
        let astrology = AstrologyProfile::default();

        let (first, source) = f.service.resolve(&owner(), ReadingKind::Monthly, &astrology).await.unwrap();
        assert_eq!(source, ReadingSource::Generated);
        assert_eq!(first.period_key.to_string(), "2024-03");
        assert!(first.scores.emotion.is_some());

        let (second, source) = f.service.resolve(&owner(), ReadingKind::Monthly, &astrology).await.unwrap();
        assert_eq!(source, ReadingSource::Cache);
        assert_eq!(second, first);
        assert_eq!(f.generator.text_calls(), 1);
    }

    #[tokio::test]
    async fn tomorrow_rolls_forward_without_generation() {
        let f = fixture();
        let astrology = AstrologyProfile::default();

        let tomorrow = f.service.get_or_generate(&owner(), ReadingKind::Tomorrow, &astrology).await.unwrap();
        assert_eq!(f.generator.text_calls(), 1);

        f.clock.advance(ChronoDuration::days(1));
        let (daily, source) = f.service.resolve(&owner(), ReadingKind::Daily, &astrology).await.unwrap();

        assert_eq!(source, ReadingSource::RolledForward);
        assert_eq!(daily.kind, ReadingKind::Daily);
        assert_eq!(daily.period_key, tomorrow.period_key);
        assert_eq!(daily.content, tomorrow.content);
        assert_eq!(daily.scores, tomorrow.scores);
        assert_eq!(f.generator.text_calls(), 1);
        assert_eq!(f.cache.len(), 2);
    }

    #[tokio::test]
    async fn generation_failure_is_returned_and_not_cached() {
        let f = fixture();
        f.generator.set_text_failure(Some(GenerationError::Quota("daily limit".into())));

        let err = f
            .service
            .get_or_generate(&owner(), ReadingKind::Daily, &AstrologyProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReadingError::Generation(GenerationError::Quota(_))));
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn regenerate_overwrites_current_entry() {
        let f = fixture();
        let astrology = AstrologyProfile::default();
        let first = f.service.get_or_generate(&owner(), ReadingKind::Daily, &astrology).await.unwrap();

        let second = f.service.regenerate(&owner(), ReadingKind::Daily, &astrology).await.unwrap();
        assert_eq!(second.period_key, first.period_key);
        assert_ne!(second.scores, first.scores);

        let (cached, _) = f.service.resolve(&owner(), ReadingKind::Daily, &astrology).await.unwrap();
        assert_eq!(cached, second);
        assert_eq!(f.cache.len(), 1);
    }

    #[test]
    fn parse_reading_variants() {
        let (content, scores) = parse_reading(r#"{"guidance": " Be bold. ", "emotionScore": 150, "energyScore": 42.4}"#);
        assert_eq!(content, "Be bold.");
        assert_eq!(scores, ReadingScores { emotion: Some(100), energy: Some(42) });

        let (content, _) = parse_reading("```json\n{\"guidance\": \"Fenced.\"}\n```");
        assert_eq!(content, "Fenced.");

        let (content, scores) = parse_reading("Just prose.");
        assert_eq!(content, "Just prose.");
        assert_eq!(scores, ReadingScores::default());
    }

    proptest! {
        /// Property: extracted scores always land in 0..=100.
        #[test]
        fn scores_are_clamped(emotion in -1.0e6f64..1.0e6, energy in -1.0e6f64..1.0e6) {
            let raw = serde_json::json!({"guidance": "g", "emotionScore": emotion, "energyScore": energy}).to_string();
            let (_, scores) = parse_reading(&raw);
            prop_assert!(scores.emotion.unwrap() <= 100);
            prop_assert!(scores.energy.unwrap() <= 100);
        }
    }
}
