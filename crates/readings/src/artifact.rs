//! Generated artifacts and their release schedule.
//!
//! Visibility is purely a function of elapsed time: until `release_at` has
//! passed, consumer-facing reads report "not ready" and carry no content,
//! even though the content already exists.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use celestia_core::{ArtifactId, DomainError, OwnerId, RequestId};

use crate::astrology::AstrologyProfile;

/// Where the generated portrait lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// Uploaded to object storage or hosted by the generation provider.
    Url { url: String },
    /// Object storage unavailable; bytes kept with the artifact (base64).
    Inline { mime_type: String, data_base64: String },
    /// Generation failed; a stand-in image URL.
    Placeholder { url: String },
}

impl ImageRef {
    /// URL to hand out, if the image is addressable.
    pub fn public_url(&self) -> Option<&str> {
        match self {
            ImageRef::Url { url } | ImageRef::Placeholder { url } => Some(url),
            ImageRef::Inline { .. } => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ImageRef::Placeholder { .. })
    }
}

/// Release delay settings.
///
/// `release_delay_minutes` is what the system actually waits;
/// `promised_window_hours` is what is advertised to the owner. The two are
/// configured independently.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePolicy {
    pub release_delay_minutes: u32,
    pub promised_window_hours: u32,
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self {
            release_delay_minutes: 600,
            promised_window_hours: 24,
        }
    }
}

impl ReleasePolicy {
    pub fn new(release_delay_minutes: u32, promised_window_hours: u32) -> Self {
        Self {
            release_delay_minutes,
            promised_window_hours,
        }
    }

    /// Returns a warning when the advertised window is shorter than the real delay.
    pub fn check_promise(&self) -> Option<String> {
        let promised_minutes = u64::from(self.promised_window_hours) * 60;
        if promised_minutes < u64::from(self.release_delay_minutes) {
            Some(format!(
                "promised window of {}h is shorter than the {}min release delay",
                self.promised_window_hours, self.release_delay_minutes
            ))
        } else {
            None
        }
    }

    pub fn schedule_for(&self, generated_at: DateTime<Utc>, notify: bool) -> ReleaseSchedule {
        ReleaseSchedule {
            generated_at,
            release_at: generated_at + Duration::minutes(i64::from(self.release_delay_minutes)),
            release_delay_minutes: self.release_delay_minutes,
            promised_window_hours: self.promised_window_hours,
            notification_sent: false,
            notification_scheduled: notify,
            notified_at: None,
        }
    }
}

/// Scheduling metadata attached to every artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSchedule {
    pub generated_at: DateTime<Utc>,
    pub release_at: DateTime<Utc>,
    pub release_delay_minutes: u32,
    pub promised_window_hours: u32,
    pub notification_sent: bool,
    pub notification_scheduled: bool,
    pub notified_at: Option<DateTime<Utc>>,
}

impl ReleaseSchedule {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        now >= self.release_at
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.release_at - now).max(Duration::zero())
    }

    /// Notification is owed: released, scheduled and not yet sent.
    pub fn is_notification_due(&self, now: DateTime<Utc>) -> bool {
        self.notification_scheduled && !self.notification_sent && self.is_ready(now)
    }

    /// One-way flip of `notification_sent`.
    pub fn mark_notified(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.notification_sent {
            return Err(DomainError::invalid_transition("notification already sent"));
        }
        if !self.is_ready(now) {
            return Err(DomainError::invariant(format!(
                "cannot notify before release at {}",
                self.release_at
            )));
        }
        self.notification_sent = true;
        self.notified_at = Some(now);
        Ok(())
    }
}

/// The generated bundle for one completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub id: ArtifactId,
    pub owner_id: OwnerId,
    pub request_id: RequestId,
    pub image: ImageRef,
    pub report: String,
    pub natal_chart: Option<String>,
    pub astrology: AstrologyProfile,
    pub schedule: ReleaseSchedule,
}

impl GeneratedArtifact {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_ready(now)
    }

    /// Consumer-facing view; content is withheld until release.
    pub fn visibility(&self, now: DateTime<Utc>) -> ArtifactVisibility {
        let ready = self.is_ready(now);
        ArtifactVisibility {
            artifact_id: self.id,
            ready,
            release_at: self.schedule.release_at,
            time_remaining_secs: self.schedule.time_remaining(now).num_seconds(),
            promised_window_hours: self.schedule.promised_window_hours,
            content: ready.then(|| ArtifactContent {
                image: self.image.clone(),
                report: self.report.clone(),
                natal_chart: self.natal_chart.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactContent {
    pub image: ImageRef,
    pub report: String,
    pub natal_chart: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactVisibility {
    pub artifact_id: ArtifactId,
    pub ready: bool,
    pub release_at: DateTime<Utc>,
    pub time_remaining_secs: i64,
    pub promised_window_hours: u32,
    pub content: Option<ArtifactContent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn artifact(policy: ReleasePolicy) -> GeneratedArtifact {
        GeneratedArtifact {
            id: ArtifactId::new(),
            owner_id: OwnerId::parse("owner@example.com").unwrap(),
            request_id: RequestId::new(),
            image: ImageRef::Url { url: "https://cdn.example.com/sketch.png".into() },
            report: "report".into(),
            natal_chart: None,
            astrology: AstrologyProfile::default(),
            schedule: policy.schedule_for(generated_at(), true),
        }
    }

    #[test]
    fn release_at_is_generated_at_plus_delay() {
        let a = artifact(ReleasePolicy::new(600, 24));
        assert_eq!(a.schedule.release_at, generated_at() + Duration::minutes(600));
        assert!(!a.is_ready(generated_at() + Duration::minutes(599)));
        assert!(a.is_ready(generated_at() + Duration::minutes(601)));
    }

    #[test]
    fn visibility_withholds_content_until_release() {
        let a = artifact(ReleasePolicy::new(60, 24));

        let early = a.visibility(generated_at() + Duration::minutes(15));
        assert!(!early.ready);
        assert!(early.content.is_none());
        assert_eq!(early.time_remaining_secs, 45 * 60);

        let late = a.visibility(generated_at() + Duration::minutes(90));
        assert!(late.ready);
        assert_eq!(late.time_remaining_secs, 0);
        assert_eq!(late.content.unwrap().report, "report");
    }

    #[test]
    fn notification_flag_flips_once_and_only_after_release() {
        let mut schedule = ReleasePolicy::new(10, 1).schedule_for(generated_at(), true);

        let before = generated_at() + Duration::minutes(5);
        assert!(!schedule.is_notification_due(before));
        assert!(matches!(schedule.mark_notified(before), Err(DomainError::InvariantViolation(_))));

        let after = generated_at() + Duration::minutes(10);
        assert!(schedule.is_notification_due(after));
        schedule.mark_notified(after).unwrap();
        assert!(schedule.notification_sent);
        assert_eq!(schedule.notified_at, Some(after));
        assert!(!schedule.is_notification_due(after));
        assert!(matches!(schedule.mark_notified(after), Err(DomainError::InvalidTransition(_))));
    }

    #[test]
    fn unscheduled_notification_is_never_due() {
        let schedule = ReleasePolicy::new(0, 1).schedule_for(generated_at(), false);
        assert!(!schedule.is_notification_due(generated_at() + Duration::days(1)));
    }

    #[test]
    fn promise_shorter_than_delay_is_flagged() {
        assert!(ReleasePolicy::new(600, 24).check_promise().is_none());
        assert!(ReleasePolicy::new(60, 1).check_promise().is_none());
        assert!(ReleasePolicy::new(600, 2).check_promise().is_some());
    }

    #[test]
    fn inline_image_has_no_public_url() {
        let inline = ImageRef::Inline { mime_type: "image/png".into(), data_base64: "AAAA".into() };
        assert_eq!(inline.public_url(), None);
        let placeholder = ImageRef::Placeholder { url: "https://x/p.png".into() };
        assert!(placeholder.is_placeholder());
        assert_eq!(placeholder.public_url(), Some("https://x/p.png"));
    }

    proptest! {
        /// Property: readiness is false strictly before release and true from release on.
        #[test]
        fn is_ready_is_a_threshold(delay in 0u32..10_000, offset_secs in -2_000_000i64..2_000_000i64) {
            let schedule = ReleasePolicy::new(delay, 24).schedule_for(generated_at(), true);
            prop_assert!(schedule.release_at >= schedule.generated_at);

            let t = schedule.release_at + Duration::seconds(offset_secs);
            prop_assert_eq!(schedule.is_ready(t), offset_secs >= 0);
        }
    }
}
