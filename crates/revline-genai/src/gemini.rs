//! Gemini generator adapter.
//!
//! Calls the `generateContent` REST endpoint and parses the candidate
//! payload into a [`GenerateResponse`]. Structured shapes request a JSON
//! response MIME type and the candidate text is parsed as JSON; the text
//! shape passes the candidate through as a string.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use crate::trait_def::Generator;
use crate::types::{GenerateRequest, GenerateResponse, GeneratorError, OutputShape};

/// Default wall-time budget for one generation call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Generator adapter for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a client for the default model and endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the endpoint base URL (useful against a local stub server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait::async_trait]
impl Generator for GeminiClient {
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, GeneratorError> {
        let body = build_request_body(&request);
        debug!(model = %self.model, shape = ?request.shape, "calling generator");

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| classify_transport_error(e, self.timeout))?;
        parse_response(&payload, request.shape)
    }
}

/// Map reqwest timeouts onto the dedicated variant; everything else stays a
/// transport error.
fn classify_transport_error(err: reqwest::Error, timeout: Duration) -> GeneratorError {
    if err.is_timeout() {
        GeneratorError::Timeout(timeout)
    } else {
        GeneratorError::Request(err)
    }
}

/// Assemble the `generateContent` request body.
fn build_request_body(request: &GenerateRequest) -> Value {
    let mut generation_config = json!({});
    if request.shape != OutputShape::Text {
        generation_config["responseMimeType"] = json!("application/json");
    }
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }],
        }],
        "systemInstruction": {
            "parts": [{ "text": request.system_instruction }],
        },
        "generationConfig": generation_config,
    })
}

/// Extract the candidate text and token cost from a `generateContent`
/// response payload, and check the payload against the declared shape.
fn parse_response(payload: &Value, shape: OutputShape) -> Result<GenerateResponse, GeneratorError> {
    let text = payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            GeneratorError::Malformed("response carried no candidate text".to_string())
        })?;

    let tokens_used = payload
        .pointer("/usageMetadata/totalTokenCount")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let data = match shape {
        OutputShape::Text => Value::String(text.to_string()),
        OutputShape::JsonObject | OutputShape::JsonArray => {
            let parsed: Value = serde_json::from_str(text).map_err(|e| {
                GeneratorError::Malformed(format!("candidate text is not valid JSON: {e}"))
            })?;
            match (shape, &parsed) {
                (OutputShape::JsonObject, Value::Object(_)) => parsed,
                (OutputShape::JsonArray, Value::Array(_)) => parsed,
                _ => {
                    return Err(GeneratorError::Malformed(format!(
                        "candidate JSON does not match the declared {shape:?} shape"
                    )));
                }
            }
        }
    };

    Ok(GenerateResponse { data, tokens_used })
}
