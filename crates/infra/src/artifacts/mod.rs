//! Generated artifact persistence.
//!
//! Artifacts are written once at completion; the only later mutation is the
//! one-way `notification_sent` flip performed by the notification dispatcher.

pub mod postgres;
pub mod store;

pub use postgres::PostgresArtifactStore;
pub use store::{ArtifactStore, InMemoryArtifactStore};
