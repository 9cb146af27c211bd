//! `celestia-core`: foundation building blocks shared by every crate.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error model and the clock
//! abstraction that every time-based decision reads from.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{ArtifactId, OwnerId, RequestId};
