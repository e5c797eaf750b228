//! Configuration for the generation endpoint, retries and the sketch page

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use log::{debug, warn};

pub const DEFAULT_API_BASE: &str
  = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MOUNT_ID: &str = "canvas-container";
pub const DEFAULT_CODE_LANGUAGE: &str = "javascript";

/// Environment variables consulted by `SketchConfig::apply_env`
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "SKETCHGEN_MODEL";
pub const ENV_API_BASE: &str = "SKETCHGEN_API_BASE";

/// Instruction sent as the system message of every request.
/// The model must answer with an instance-mode p5.js body only.
pub const SYSTEM_INSTRUCTION: &str = "You are a specialized p5.js code \
generator. Your task is to ONLY respond with the complete body of a p5.js \
sketch function, using instance mode. This code body will be placed inside \
'function sketch(p) { ... YOUR CODE HERE ... }'. You MUST define \
p.setup = function() { ... } and p.draw = function() { ... } within your \
generated code. Use p.createCanvas, p.background, p.fill, etc. for all p5 \
functions. Enclose the code block in triple backticks and use the language \
identifier javascript. DO NOT include any explanatory text, markdown, or \
comments outside the code block. The code must be ready to run.";

/// Generation endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig
{   /// API base URL, without the `/chat/completions` suffix
    pub api_base: String
  , /// Bearer credential; not validated client-side
    pub api_key: Option<String>
  , /// Model identifier
    pub model: String
  , /// Sampling temperature
    pub temperature: f32
  , /// Max tokens to generate
    pub max_tokens: usize
  , /// Request timeout in seconds
    pub timeout_secs: Option<u64>
  , /// Language tag of the fenced block to extract
    pub code_language: String
}

impl Default for ApiConfig
{   fn default() -> Self
    {   ApiConfig
        {   api_base: DEFAULT_API_BASE.to_string()
          , api_key: None
          , model: DEFAULT_MODEL.to_string()
          , temperature: 0.7
          , max_tokens: 2000
          , timeout_secs: Some(60)
          , code_language: DEFAULT_CODE_LANGUAGE.to_string()
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig
{   /// Total attempts, including the first one
    pub max_attempts: usize
  , /// Backoff multiplier for retries
    pub backoff_multiplier: f32
  , /// Backoff base in milliseconds
    pub initial_backoff_ms: u64
}

impl Default for RetryConfig
{   fn default() -> Self
    {   RetryConfig
        {   max_attempts: 3
          , backoff_multiplier: 2.0
          , initial_backoff_ms: 1000
        }
    }
}

/// Where generated sketches are hosted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig
{   /// Directory that receives `index.html` and `sketch.js`
    pub output_dir: PathBuf
  , /// Id of the element the sketch mounts into
    pub mount_id: String
  , /// Script URL for the p5.js library
    pub p5_url: String
}

impl Default for StageConfig
{   fn default() -> Self
    {   StageConfig
        {   output_dir: PathBuf::from("sketch")
          , mount_id: DEFAULT_MOUNT_ID.to_string()
          , p5_url:
              "https://cdn.jsdelivr.net/npm/p5@1.9.0/lib/p5.min.js"
                .to_string()
        }
    }
}

/// sketchgen configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig
{   pub api: ApiConfig
  , pub retry: RetryConfig
  , pub stage: StageConfig
  , /// JSON-lines chat history; disabled when absent
    pub history_path: Option<PathBuf>
}

impl SketchConfig
{   /// Load a configuration from a JSON file.
    /// Missing fields fall back to their defaults.
    pub fn from_file(path: &Path)
      -> Result<Self, crate::error::Error>
    {   debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
          crate::error::Error::InvalidConfiguration(
            format!("{}: {}", path.display(), e)
          )
        })
    }

    /// Override fields from environment-style variables.
    /// `lookup` is `std::env::var(..).ok()` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where F: Fn(&str) -> Option<String>
    {   if let Some(key) = lookup(ENV_API_KEY)
        {   debug!("API key taken from {}", ENV_API_KEY);
            self.api.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_MODEL)
        {   self.api.model = model;
        }
        if let Some(base) = lookup(ENV_API_BASE)
        {   self.api.api_base = base;
        }
    }

    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   if self.retry.max_attempts == 0
        {   return Err(crate::error::Error::InvalidConfiguration(
              "retry.max_attempts must be at least 1".to_string()
            ));
        }
        if self.api.api_base.trim().is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              "api.api_base must not be empty".to_string()
            ));
        }
        if self.api.code_language.trim().is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              "api.code_language must not be empty".to_string()
            ));
        }
        if self.api.api_key.as_deref().map_or(true, str::is_empty)
        {   warn!(
              "No API key configured; requests will be rejected remotely"
            );
        }
        Ok(())
    }
}

/// Read a `.env` file if it exists; a missing file is an empty map.
/// Quoting and escapes follow dotenvy; process variables are untouched.
pub fn load_dotenv(path: &Path)
  -> Result<HashMap<String, String>, crate::error::Error>
{   let invalid = |e: dotenvy::Error| {
      crate::error::Error::InvalidConfiguration(
        format!("{}: {}", path.display(), e)
      )
    };
    let iter = match dotenvy::from_path_iter(path)
    {   Ok(iter) => iter
      , Err(dotenvy::Error::Io(e))
          if e.kind() == std::io::ErrorKind::NotFound => {
          debug!("No {} file", path.display());
          return Ok(HashMap::new());
        }
      , Err(e) => return Err(invalid(e))
    };

    let mut vars = HashMap::new();
    for item in iter
    {   let (key, value) = item.map_err(invalid)?;
        vars.insert(key, value);
    }
    debug!("Loaded {} variables from {}", vars.len(), path.display());
    Ok(vars)
}
