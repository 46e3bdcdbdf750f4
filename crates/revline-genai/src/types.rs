//! Request/response types and the generator error taxonomy.

use std::time::Duration;

use serde_json::Value;

/// Expected shape of the generator's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// Free-form prose (chat turns).
    Text,
    /// A single JSON object conforming to the caller's schema.
    JsonObject,
    /// A JSON array (the "array hint" for list-shaped stages).
    JsonArray,
}

/// One call to the generator.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_instruction: String,
    pub shape: OutputShape,
}

impl GenerateRequest {
    /// A structured-output request (object unless `array_hint`).
    pub fn structured(
        prompt: impl Into<String>,
        system_instruction: impl Into<String>,
        array_hint: bool,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: system_instruction.into(),
            shape: if array_hint {
                OutputShape::JsonArray
            } else {
                OutputShape::JsonObject
            },
        }
    }

    /// A plain-text request (chat turns).
    pub fn text(prompt: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: system_instruction.into(),
            shape: OutputShape::Text,
        }
    }
}

/// Successful generator output.
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// Parsed JSON for structured shapes, `Value::String` for text.
    pub data: Value,
    /// Tokens billed for this call, as reported by the vendor.
    pub tokens_used: i64,
}

/// Errors from a generator call. A schema-nonconforming payload is reported
/// here too ([`GeneratorError::Malformed`]) so callers treat it exactly like
/// any other generation failure.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generator call timed out after {0:?}")]
    Timeout(Duration),

    #[error("generator API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("generator returned a malformed payload: {0}")]
    Malformed(String),
}
