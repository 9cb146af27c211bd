//! Infrastructure layer: stores, job queue, worker, periodic tasks, config.

pub mod artifacts;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod notifications;
pub mod pipeline;
pub mod scheduler;
pub mod storage;
pub mod worker;


pub use config::{ConfigError, PipelineConfig};
pub use error::StoreError;
pub use pipeline::{Pipeline, PipelineError, Stores};
