//! Generation endpoint clients

use std::future::Future;

pub mod openai;

// Re-export for convenience
pub use openai::OpenAiClient;

/// One round-trip to a text generation endpoint.
/// Implementations make exactly one attempt per call.
pub trait GenerationClient
{   fn generate(
      &self
    , request: &crate::request::GenerationRequest
    ) -> impl Future<
        Output = Result<
          crate::request::GenerationResult,
          crate::error::Error
        >
      > + Send;
}
