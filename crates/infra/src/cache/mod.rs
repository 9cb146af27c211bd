//! Date-scoped reading cache with "tomorrow to daily" roll-forward.

pub mod postgres;
pub mod service;
pub mod store;

pub use postgres::PostgresReadingCache;
pub use service::{ReadingError, ReadingService, ReadingSource, parse_reading};
pub use store::{InMemoryReadingCache, ReadingCache};
