//! `celestia-ai`
//!
//! **Responsibility:** boundary to the external generation services.
//!
//! This crate is intentionally **not** part of the pipeline state machine:
//! - It must not touch stores or request state.
//! - It turns prompts into text or images, or into a typed [`GenerationError`].
//! - Fallback substitution on failure is the caller's decision.

pub mod gemini;
pub mod generator;
pub mod mock;
pub mod prompt;
pub mod result;

pub use gemini::{GeminiClient, GeminiConfig};
pub use generator::{ImageGenerator, Prompt, TextGenerator};
pub use mock::MockGenerator;
pub use result::{GeneratedImage, GeneratedText, GenerationError, TokenUsage};
