pub mod error;
pub mod config;
pub mod extract;
pub mod providers;
pub mod request;
pub mod retry;
pub mod runtime;
pub mod page;
pub mod hooks;
pub mod history;
pub mod client;

/*

sketchgen: prompt in, running p5.js sketch out. one request syntax to
an openai-compatible chat endpoint, bounded retries with exponential
backoff, and exactly one live sketch at a time.

sketchgen/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Re-exports
│   ├── main.rs         # CLI: REPL or one-shot prompt
│   ├── error.rs        # Error enum shared by every module
│   ├── config.rs       # Endpoint, retry and page configuration
│   ├── extract.rs      # Fenced code block extraction
│   ├── request.rs      # GenerationRequest / GenerationResult
│   ├── providers/      # One-attempt endpoint clients
│   │   ├── mod.rs      # GenerationClient trait
│   │   └── openai.rs   # chat/completions client
│   ├── retry.rs        # Retry policy and backoff loop
│   ├── runtime.rs      # Single-instance sketch lifecycle
│   ├── page.rs         # p5 page compiler / runtime / stage
│   ├── hooks.rs        # UI surface and identity seams
│   ├── history.rs      # Chat history store
│   └── client.rs       # Backend task driving one prompt at a time
└── tests/              # Integration tests

*/

pub use client::{PromptReply, PromptReport, SketchBackend, SketchBackendState};
pub use config::SketchConfig;
pub use error::Error;
pub use extract::extract_code;
pub use providers::{GenerationClient, OpenAiClient};
pub use request::{GenerationRequest, GenerationResult};
pub use retry::{generate_with_retry, RetryNotice, RetryPolicy};
pub use runtime::{RunOutcome, SketchRuntimeManager};

/// Runtime manager wired to the p5 page host described by `stage`
pub fn page_runtime_manager(
  stage: &config::StageConfig
) -> SketchRuntimeManager
{   SketchRuntimeManager::new(
      Box::new(page::InstanceModeCompiler)
    , Box::new(page::P5PageRuntime::new(stage.output_dir.clone()))
    , Box::new(page::PageStage::new(stage))
    , stage.mount_id.clone()
    )
}
