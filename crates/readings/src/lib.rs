//! Readings domain module.
//!
//! This crate contains the business rules of the deferred generation
//! pipeline, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage): generation requests and their lifecycle, the intake
//! gate, astrology derivation, artifacts with their release schedule, and
//! date-scoped cached readings.

pub mod artifact;
pub mod astrology;
pub mod intake;
pub mod reading;
pub mod request;

pub use artifact::{
    ArtifactContent, ArtifactVisibility, GeneratedArtifact, ImageRef, ReleasePolicy,
    ReleaseSchedule,
};
pub use astrology::{AstrologyProfile, Element, SunSign};
pub use intake::{IntakeError, IntakeGate, IntakeSubmission};
pub use reading::{CachedReading, PeriodKey, ReadingKind, ReadingScores};
pub use request::{
    BirthDetails, GenerationPayload, GenerationRequest, RequestStatus, RequestStatusView,
    MAX_ERROR_LEN,
};
