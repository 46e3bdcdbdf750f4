//! The `Generator` trait -- the adapter interface for generative text
//! vendors.
//!
//! The trait is intentionally object-safe so orchestration code can hold an
//! `Arc<dyn Generator>` and tests can substitute scripted fakes.

use async_trait::async_trait;

use crate::types::{GenerateRequest, GenerateResponse, GeneratorError};

/// Adapter interface for the external generative text service.
///
/// Implementors translate a [`GenerateRequest`] into one vendor call and
/// report the parsed payload plus the vendor's token cost. Implementations
/// must not retry internally; retry policy (there is none) belongs to the
/// caller.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Perform one generation call.
    async fn generate(&self, request: GenerateRequest)
        -> Result<GenerateResponse, GeneratorError>;
}

// Compile-time assertion: Generator must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Generator) {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutputShape;
    use serde_json::json;

    /// A trivial generator used only to prove the trait is implementable
    /// and usable as `dyn Generator`.
    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(
            &self,
            request: GenerateRequest,
        ) -> Result<GenerateResponse, GeneratorError> {
            Ok(GenerateResponse {
                data: json!(request.prompt),
                tokens_used: 1,
            })
        }
    }

    #[tokio::test]
    async fn echo_generator_via_trait_object() {
        let generator: Box<dyn Generator> = Box::new(EchoGenerator);
        let response = generator
            .generate(GenerateRequest::text("hello", "be brief"))
            .await
            .unwrap();
        assert_eq!(response.data, json!("hello"));
        assert_eq!(response.tokens_used, 1);
    }

    #[test]
    fn structured_request_maps_array_hint() {
        let object = GenerateRequest::structured("p", "s", false);
        assert_eq!(object.shape, OutputShape::JsonObject);
        let array = GenerateRequest::structured("p", "s", true);
        assert_eq!(array.shape, OutputShape::JsonArray);
    }
}
