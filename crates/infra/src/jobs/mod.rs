//! Generation request queue.
//!
//! ## Components
//!
//! - `RequestStore`: durable request rows with atomic create/claim/transition
//! - `JobQueue`: FIFO enqueue/claim/complete/fail over a store and a clock
//! - `IdempotencyGuard`: one active request per owner
//! - `GenerationPoller`: periodic task running the worker on one claim per tick
//!
//! Failed requests are terminal: there is no retry and no dead-letter queue.

pub mod guard;
pub mod poller;
pub mod postgres;
pub mod queue;
pub mod store;

pub use guard::{Admission, IdempotencyGuard};
pub use poller::{GenerationPoller, PollOutcome, PollerStats};
pub use postgres::PostgresRequestStore;
pub use queue::JobQueue;
pub use store::{CreateOutcome, InMemoryRequestStore, RequestStore};
