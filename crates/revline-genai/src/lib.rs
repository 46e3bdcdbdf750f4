//! Generator client interface for revline.
//!
//! The pipeline and chat layers call the external generative text service
//! only through the object-safe [`Generator`] trait, so tests can script
//! responses and the deployed service can swap vendors. [`GeminiClient`]
//! is the production adapter.

pub mod gemini;
pub mod trait_def;
pub mod types;

pub use gemini::GeminiClient;
pub use trait_def::Generator;
pub use types::{GenerateRequest, GenerateResponse, GeneratorError, OutputShape};
