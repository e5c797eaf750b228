//! Request and result types for sketch generation

use serde::{Deserialize, Serialize};

/// One generation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest
{   prompt: String
  , system_instruction: String
  , model: String
  , temperature: f32
  , max_tokens: usize
}

impl GenerationRequest
{   /// Build a request; blank prompts are rejected
    pub fn new(
      prompt: impl Into<String>
    , system_instruction: impl Into<String>
    , model: impl Into<String>
    , temperature: f32
    , max_tokens: usize
    ) -> Result<Self, crate::error::Error>
    {   let prompt = prompt.into();
        if prompt.trim().is_empty()
        {   return Err(crate::error::Error::EmptyPrompt);
        }
        Ok(GenerationRequest
        {   prompt
          , system_instruction: system_instruction.into()
          , model: model.into()
          , temperature
          , max_tokens
        })
    }

    /// Build a request using the configured model and sampling values
    pub fn from_config(
      prompt: impl Into<String>
    , api: &crate::config::ApiConfig
    ) -> Result<Self, crate::error::Error>
    {   GenerationRequest::new(
          prompt
        , crate::config::SYSTEM_INSTRUCTION
        , api.model.clone()
        , api.temperature
        , api.max_tokens
        )
    }

    pub fn prompt(&self) -> &str { &self.prompt }

    pub fn system_instruction(&self) -> &str
    {   &self.system_instruction
    }

    pub fn model(&self) -> &str { &self.model }

    pub fn temperature(&self) -> f32 { self.temperature }

    pub fn max_tokens(&self) -> usize { self.max_tokens }
}

/// Outcome of one successful round-trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult
{   /// Full model text, unprocessed
    pub raw_text: String
  , /// First fenced block of the expected language, if any
    pub code_body: Option<String>
}

impl GenerationResult
{   /// Pair raw text with whatever the extractor finds in it
    pub fn from_raw(raw_text: String, language: &str) -> Self
    {   let code_body
          = crate::extract::extract_code(&raw_text, language);
        GenerationResult
        {   raw_text
          , code_body
        }
    }
}
