//! `celestia-worker`: process wiring for the deferred generation pipeline.

pub mod app;
