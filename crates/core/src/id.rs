//! Strongly-typed identifiers used across the pipeline.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a generation request (one row in the job queue).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

/// Identifier of a generated artifact.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(RequestId, "RequestId");
impl_uuid_newtype!(ArtifactId, "ArtifactId");

/// Stable owner identity: a normalized e-mail address.
///
/// Correlates a quiz submission, its payment, the generated content and the
/// account across asynchronous steps. Normalization (trim + lowercase) happens
/// once here, so every store can key on the raw string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_lowercase();
        let mut parts = normalized.splitn(2, '@');
        let local = parts.next().unwrap_or_default();
        let domain = parts.next().unwrap_or_default();

        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(DomainError::invalid_id(format!(
                "OwnerId: expected an e-mail address, got {raw:?}"
            )));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(DomainError::invalid_id(format!(
                "OwnerId: whitespace inside address {raw:?}"
            )));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OwnerId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_id_is_normalized() {
        let owner = OwnerId::parse("  Jane.Doe@Example.COM ").unwrap();
        assert_eq!(owner.as_str(), "jane.doe@example.com");
        assert_eq!(owner, OwnerId::parse("jane.doe@example.com").unwrap());
    }

    #[test]
    fn owner_id_rejects_non_addresses() {
        for raw in ["", "   ", "no-at-sign", "@example.com", "jane@", "a@b@c", "ja ne@example.com"] {
            assert!(
                matches!(OwnerId::parse(raw), Err(DomainError::InvalidId(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn owner_id_deserializes_through_normalization() {
        let owner: OwnerId = serde_json::from_str("\"Jane@Example.com\"").unwrap();
        assert_eq!(owner.as_str(), "jane@example.com");
        assert!(serde_json::from_str::<OwnerId>("\"nope\"").is_err());
    }

    #[test]
    fn request_id_parses_from_string() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(matches!(
            "not-a-uuid".parse::<RequestId>(),
            Err(DomainError::InvalidId(msg)) if msg.starts_with("RequestId")
        ));
    }
}
