use std::time::Duration;
use serde::{Deserialize, Serialize};
use log::{debug, trace, error};

use crate::request::{GenerationRequest, GenerationResult};

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub temperature: f32
  , pub max_tokens: usize
}

impl From<&GenerationRequest> for ChatCompletionRequest
{   fn from(request: &GenerationRequest) -> Self
    {   ChatCompletionRequest
        {   model: request.model().to_string()
          , messages: vec![
              ChatMessage
              {   role: "system".to_string()
                , content: request.system_instruction().to_string()
              }
            , ChatMessage
              {   role: "user".to_string()
                , content: request.prompt().to_string()
              }
            ]
          , temperature: request.temperature()
          , max_tokens: request.max_tokens()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse
{   #[serde(default)]
    pub choices: Vec<Choice>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: Option<ResponseMessage>
  , pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage
{   pub content: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody
{   error: Option<ApiErrorDetail>
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorDetail
{   message: Option<String>
}

impl ChatCompletionResponse
{   /// Text of the first choice, if present and non-empty
    pub fn first_content(&self) -> Option<&str>
    {   self.choices.first()
          .and_then(|c| c.message.as_ref())
          .and_then(|m| m.content.as_deref())
          .filter(|text| !text.is_empty())
    }
}

/// Pull `error.message` out of a failure body, if it has one
fn remote_error_message(body: &str) -> String
{   serde_json::from_str::<ApiErrorBody>(body)
      .ok()
      .and_then(|b| b.error)
      .and_then(|d| d.message)
      .unwrap_or_else(|| "Unknown error".to_string())
}

// ===== OpenAI-compatible chat completions client =====

/// Single-attempt client for an OpenAI-compatible
/// `/chat/completions` endpoint
pub struct OpenAiClient
{   api_base: String
  , api_key: String
  , code_language: String
  , http_client: reqwest::Client
}

impl OpenAiClient
{   pub fn new(api: &crate::config::ApiConfig)
      -> Result<Self, crate::error::Error>
    {   debug!("Creating OpenAiClient for {}", api.api_base);
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = api.timeout_secs
        {   builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build().map_err(|e| {
          error!("Failed to build HTTP client: {}", e);
          crate::error::Error::InvalidConfiguration(e.to_string())
        })?;

        Ok(OpenAiClient
        {   api_base: api.api_base.trim_end_matches('/').to_string()
          , api_key: api.api_key.clone().unwrap_or_default()
          , code_language: api.code_language.clone()
          , http_client
        })
    }

    fn endpoint(&self) -> String
    {   format!("{}/chat/completions", self.api_base)
    }

    async fn send_once(
      &self
    , request: &GenerationRequest
    ) -> Result<GenerationResult, crate::error::Error>
    {   debug!("Sending generation request to: {}", request.model());

        let body = ChatCompletionRequest::from(request);
        trace!("Chat completion request: {:?}", body);

        let response = self.http_client
          .post(self.endpoint())
          .header("Authorization", format!("Bearer {}", self.api_key))
          .header("Content-Type", "application/json")
          .json(&body)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error: {}", e);
            crate::error::Error::Transport(e.to_string())
          })?;

        let status = response.status();
        trace!("Chat completion response status: {}", status);

        if !status.is_success()
        {   let error_text = response.text().await
              .unwrap_or_default();
            let message = remote_error_message(&error_text);
            error!("API error {}: {}", status, message);
            return Err(crate::error::Error::Remote
            {   status: status.as_u16()
              , message
            });
        }

        let chat_response: ChatCompletionResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            crate::error::Error::MalformedResponse(e.to_string())
          })?;

        let text = chat_response.first_content()
          .ok_or_else(|| {
            error!("No message content in response");
            crate::error::Error::MalformedResponse(
              "missing choices[0].message.content".to_string()
            )
          })?;

        Ok(GenerationResult::from_raw(
          text.to_string(),
          &self.code_language
        ))
    }
}

impl super::GenerationClient for OpenAiClient
{   async fn generate(
      &self
    , request: &GenerationRequest
    ) -> Result<GenerationResult, crate::error::Error>
    {   self.send_once(request).await
    }
}
