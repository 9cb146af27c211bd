use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use celestia_core::{ArtifactId, DomainError, OwnerId, RequestId};

/// Longest error string persisted on a failed request.
pub const MAX_ERROR_LEN: usize = 2000;

/// Lifecycle state of a generation request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for the poller.
    Queued,
    /// Claimed by a poller; generation in flight.
    Processing,
    /// Artifact produced and linked.
    Completed,
    /// Terminal failure; never retried automatically.
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Queued => "queued",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }

    /// Non-failed requests block a new request for the same owner.
    pub fn is_active(&self) -> bool {
        !matches!(self, RequestStatus::Failed)
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RequestStatus::Queued),
            "processing" => Ok(RequestStatus::Processing),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(DomainError::validation(format!("unknown request status: {other}"))),
        }
    }
}

/// Birth details captured by the quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BirthDetails {
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// Input payload of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPayload {
    /// Quiz answers keyed by question id.
    pub answers: serde_json::Map<String, serde_json::Value>,
    pub birth_details: BirthDetails,
}

impl GenerationPayload {
    /// Checked again at claim time: the stored payload may predate intake
    /// validation or have been edited by hand.
    pub fn ensure_usable(&self) -> Result<(), DomainError> {
        if self.answers.is_empty() {
            return Err(DomainError::validation("quiz answers are missing"));
        }
        Ok(())
    }

    /// String answer for a question, if present and non-empty.
    pub fn answer(&self, key: &str) -> Option<&str> {
        self.answers
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A queued unit of generation work for one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: RequestId,
    pub owner_id: OwnerId,
    pub status: RequestStatus,
    pub payload: GenerationPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub artifact_id: Option<ArtifactId>,
    pub error: Option<String>,
}

impl GenerationRequest {
    pub fn new(owner_id: OwnerId, payload: GenerationPayload, now: DateTime<Utc>) -> Self {
        Self {
            id: RequestId::new(),
            owner_id,
            status: RequestStatus::Queued,
            payload,
            created_at: now,
            updated_at: now,
            artifact_id: None,
            error: None,
        }
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != RequestStatus::Queued {
            return Err(DomainError::invalid_transition(format!(
                "request {} cannot be claimed from {}",
                self.id, self.status
            )));
        }
        self.status = RequestStatus::Processing;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_completed(
        &mut self,
        artifact_id: ArtifactId,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != RequestStatus::Processing {
            return Err(DomainError::invalid_transition(format!(
                "request {} cannot complete from {}",
                self.id, self.status
            )));
        }
        self.status = RequestStatus::Completed;
        self.artifact_id = Some(artifact_id);
        self.error = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "request {} cannot fail from {}",
                self.id, self.status
            )));
        }
        self.status = RequestStatus::Failed;
        self.error = Some(truncate_error(error));
        self.updated_at = now;
        Ok(())
    }

    pub fn status_view(&self) -> RequestStatusView {
        RequestStatusView {
            id: self.id,
            status: self.status,
            artifact_id: self.artifact_id,
            error: self.error.clone(),
        }
    }
}

/// Consumer-facing status of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatusView {
    pub id: RequestId,
    pub status: RequestStatus,
    pub artifact_id: Option<ArtifactId>,
    pub error: Option<String>,
}

/// Cut an error message to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(error: &str) -> String {
    match error.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => error[..idx].to_string(),
        None => error.to_string(),
    }
}
