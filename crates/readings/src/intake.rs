//! Intake gate: validates a quiz submission before any request exists.
//!
//! Nothing is written on rejection; the caller gets [`IntakeError::InputIncomplete`]
//! and the idempotency guard is never consulted.

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use thiserror::Error;

use celestia_core::{DomainError, OwnerId};

use crate::request::{BirthDetails, GenerationPayload};

/// Raw submission as delivered by the quiz front-end.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeSubmission {
    #[serde(default)]
    pub answers: Option<serde_json::Value>,
    #[serde(default)]
    pub birth_details: Option<RawBirthDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBirthDetails {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntakeError {
    /// Required answers or birth data are missing or malformed.
    #[error("input incomplete: {0}")]
    InputIncomplete(String),

    #[error("invalid owner identity: {0}")]
    InvalidOwner(#[from] DomainError),
}

/// Stateless validator in front of the idempotency guard.
#[derive(Debug, Default, Copy, Clone)]
pub struct IntakeGate;

impl IntakeGate {
    pub fn new() -> Self {
        Self
    }

    /// Validate owner + submission and produce the normalized payload.
    pub fn validate(
        &self,
        owner: &str,
        submission: IntakeSubmission,
    ) -> Result<(OwnerId, GenerationPayload), IntakeError> {
        let owner_id = OwnerId::parse(owner)?;

        let answers = match submission.answers {
            Some(serde_json::Value::Object(map)) if !map.is_empty() => map,
            Some(serde_json::Value::Object(_)) | None | Some(serde_json::Value::Null) => {
                return Err(IntakeError::InputIncomplete("quiz answers are required".into()));
            }
            Some(_) => {
                return Err(IntakeError::InputIncomplete("answers must be an object".into()));
            }
        };

        let raw = submission.birth_details.unwrap_or_default();

        // Older quiz versions put birth data inside the answers.
        let date_str = non_empty(raw.date)
            .or_else(|| answer_string(&answers, "birthDate"))
            .ok_or_else(|| {
                IntakeError::InputIncomplete("birthDetails.date is required (YYYY-MM-DD)".into())
            })?;
        let date = parse_birth_date(&date_str).ok_or_else(|| {
            IntakeError::InputIncomplete(format!(
                "birthDetails.date must be YYYY-MM-DD, got {date_str:?}"
            ))
        })?;

        let birth_details = BirthDetails {
            date,
            time: non_empty(raw.time).or_else(|| answer_string(&answers, "birthTime")),
            city: non_empty(raw.city).or_else(|| answer_string(&answers, "birthCity")),
        };

        Ok((owner_id, GenerationPayload { answers, birth_details }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn answer_string(answers: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    non_empty(answers.get(key).and_then(|v| v.as_str()).map(str::to_string))
}

fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission(value: serde_json::Value) -> IntakeSubmission {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn accepts_complete_submission() {
        let (owner, payload) = IntakeGate::new()
            .validate(
                "Someone@Example.com",
                submission(json!({
                    "answers": {"gender": "Male", "keyTraits": ["kind"]},
                    "birthDetails": {"date": "1990-05-15", "time": "08:30", "city": "Porto"}
                })),
            )
            .unwrap();

        assert_eq!(owner.as_str(), "someone@example.com");
        assert_eq!(payload.birth_details.date, NaiveDate::from_ymd_opt(1990, 5, 15).unwrap());
        assert_eq!(payload.birth_details.time.as_deref(), Some("08:30"));
        assert_eq!(payload.answer("gender"), Some("Male"));
    }

    #[test]
    fn missing_birth_date_is_rejected() {
        let err = IntakeGate::new()
            .validate(
                "a@b.co",
                submission(json!({"answers": {"gender": "Male"}, "birthDetails": {"city": "Oslo"}})),
            )
            .unwrap_err();
        assert!(matches!(err, IntakeError::InputIncomplete(msg) if msg.contains("birthDetails.date")));
    }

    #[test]
    fn missing_answers_are_rejected() {
        for body in [
            json!({"birthDetails": {"date": "1990-05-15"}}),
            json!({"answers": {}, "birthDetails": {"date": "1990-05-15"}}),
            json!({"answers": ["x"], "birthDetails": {"date": "1990-05-15"}}),
        ] {
            let err = IntakeGate::new().validate("a@b.co", submission(body)).unwrap_err();
            assert!(matches!(err, IntakeError::InputIncomplete(_)));
        }
    }

    #[test]
    fn birth_data_falls_back_to_answers() {
        let (_, payload) = IntakeGate::new()
            .validate(
                "a@b.co",
                submission(json!({
                    "answers": {"birthDate": "1988-12-25T00:00:00Z", "birthCity": "Rome"}
                })),
            )
            .unwrap();
        assert_eq!(payload.birth_details.date, NaiveDate::from_ymd_opt(1988, 12, 25).unwrap());
        assert_eq!(payload.birth_details.city.as_deref(), Some("Rome"));
    }

    #[test]
    fn malformed_date_and_owner_are_rejected() {
        let gate = IntakeGate::new();
        let body = || submission(json!({"answers": {"a": 1}, "birthDetails": {"date": "15/05/1990"}}));
        assert!(matches!(gate.validate("a@b.co", body()), Err(IntakeError::InputIncomplete(_))));

        let ok_body = submission(json!({"answers": {"a": 1}, "birthDetails": {"date": "1990-05-15"}}));
        assert!(matches!(gate.validate("not-an-email", ok_body), Err(IntakeError::InvalidOwner(_))));
    }
}
