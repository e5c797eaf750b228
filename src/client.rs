use tokio::sync::{mpsc, oneshot};
use log::{debug, trace, error, info, warn};

use crate::error::Error;
use crate::hooks::{ChatSurface, Identity, Role};
use crate::history::{ChatRecord, MessageStore};
use crate::providers::GenerationClient;
use crate::request::{GenerationRequest, GenerationResult};
use crate::retry::{RetryNotice, RetryPolicy};
use crate::runtime::{RunOutcome, SketchRuntimeManager};

pub const SKETCH_READY_MESSAGE: &str
  = "The AI generated the p5.js sketch below:";
pub const CONNECTION_TROUBLE_MESSAGE: &str
  = "I'm having trouble connecting to the AI right now. \
     Please check the logs for details.";
pub const SKETCH_FAILED_MESSAGE: &str
  = "The sketch could not be started.";

/// What one prompt produced
#[derive(Debug, Clone, PartialEq)]
pub struct PromptReport
{   pub result: GenerationResult
  , pub run: RunOutcome
}

pub type PromptReply = Result<PromptReport, Error>;

/// Union of all possible backend commands
pub enum BackendCommand
{   SubmitPrompt
    {   prompt: String
      , reply: oneshot::Sender<PromptReply>
    }
  , Cleanup
    {   reply: oneshot::Sender<bool>
    }
  , Shutdown
    {   reply: oneshot::Sender<()>
    }
}

/// Everything the backend task owns
pub struct SketchBackendState<C>
{   pub client: C
  , pub api: crate::config::ApiConfig
  , pub policy: RetryPolicy
  , pub manager: SketchRuntimeManager
  , pub surface: Box<dyn ChatSurface>
  , pub identity: Box<dyn Identity>
  , pub history: Box<dyn MessageStore>
}

/// Re-enables input when dropped, whatever path the prompt took
struct LoadingGuard<'a>
{   surface: &'a dyn ChatSurface
}

impl<'a> LoadingGuard<'a>
{   fn engage(surface: &'a dyn ChatSurface) -> Self
    {   surface.set_loading(true);
        LoadingGuard { surface }
    }
}

impl Drop for LoadingGuard<'_>
{   fn drop(&mut self)
    {   self.surface.set_loading(false);
    }
}

impl<C> SketchBackendState<C>
where C: GenerationClient
{   fn save(&self, role: Role, text: &str, code: Option<&str>)
    {   let record = ChatRecord::new(
          role,
          text,
          code.map(str::to_string),
          self.identity.user_id()
        );
        if let Err(e) = self.history.save_message(&record)
        {   warn!("Failed to save {} message: {}", role, e);
        }
    }

    /// Drive one prompt through generation and the sketch runtime
    pub async fn handle_submit(&mut self, prompt: String) -> PromptReply
    {   let request = GenerationRequest::from_config(
          prompt.as_str(), &self.api
        )?;

        let _loading = LoadingGuard::engage(self.surface.as_ref());
        self.surface.append_message(Role::User, &prompt, None);
        self.save(Role::User, &prompt, None);

        let result = match generate_with_progress(
          &self.client, &self.policy, self.surface.as_ref(), &request
        ).await
        {   Ok(result) => result
          , Err(e) => {
              error!("Generation failed: {}", e);
              self.surface.show_error(&format!(
                "Failed to get a response from the AI. \
                 Please try again later. Error: {}",
                e
              ));
              self.surface.append_message(
                Role::Model, CONNECTION_TROUBLE_MESSAGE, None
              );
              self.save(
                Role::Model,
                &format!("Failed to generate code: {}", e),
                None
              );
              return Err(e);
            }
        };

        let code = result.code_body.as_deref();
        let display = match code
        {   Some(_) => SKETCH_READY_MESSAGE.to_string()
          , None => format!(
              "I encountered an issue generating a runnable sketch. \
               Here is the raw output I received: \n\n{}",
              result.raw_text
            )
        };
        self.surface.append_message(Role::Model, &display, code);
        self.save(Role::Model, &result.raw_text, code);
        self.surface.show_code(code.unwrap_or(&result.raw_text));

        let run = match code
        {   Some(code) => self.manager.run(code)
          , None => {
              debug!("No code block in response; keeping current sketch");
              RunOutcome::NothingToRun
            }
        };
        if let RunOutcome::Failed(e) = &run
        {   self.surface.show_error(&e.to_string());
            self.surface.append_message(
              Role::Model,
              &format!("{} {}", SKETCH_FAILED_MESSAGE, e),
              None
            );
        }

        Ok(PromptReport { result, run })
    }
}

/// Generate with retries, showing each retry in the conversation
async fn generate_with_progress<C>(
  client: &C
, policy: &RetryPolicy
, surface: &dyn ChatSurface
, request: &GenerationRequest
) -> Result<GenerationResult, Error>
where C: GenerationClient
{   let (notice_tx, mut notice_rx)
      = mpsc::unbounded_channel::<RetryNotice>();

    let generation = async {
      let tx = notice_tx;
      crate::retry::generate_with_retry(
        client, request, policy, Some(&tx)
      ).await
    };
    let progress = async {
      while let Some(notice) = notice_rx.recv().await
      {   surface.append_message(
            Role::Model,
            &format!(
              "Attempt {} of {} failed ({}). Retrying in {}s...",
              notice.attempt,
              notice.max_attempts,
              notice.error,
              notice.delay.as_secs()
            ),
            None
          );
      }
    };

    let (result, ()) = tokio::join!(generation, progress);
    result
}

/// Public API for the sketch backend - owns the task
pub struct SketchBackend
{   tx: mpsc::UnboundedSender<BackendCommand>
  , _task_handle: tokio::task::JoinHandle<()>
}

impl SketchBackend
{   /// Spawn the backend task.
    /// Commands are handled one at a time, in arrival order.
    pub fn new<C>(state: SketchBackendState<C>) -> Self
    where C: GenerationClient + Send + Sync + 'static
    {   debug!("Creating SketchBackend with task ownership");
        let (tx, rx) = mpsc::unbounded_channel();

        let _task_handle = tokio::spawn(async move {
          run_backend_loop(rx, state).await
        });

        SketchBackend
        {   tx
          , _task_handle
        }
    }

    /// Queue a prompt - returns immediately
    pub fn submit_prompt(
      &self
    , prompt: impl Into<String>
    ) -> Result<oneshot::Receiver<PromptReply>, Error>
    {   let (reply, reply_rx) = oneshot::channel();
        self.send(BackendCommand::SubmitPrompt
        {   prompt: prompt.into()
          , reply
        })?;
        Ok(reply_rx)
    }

    /// Queue teardown of the running sketch.
    /// Resolves to whether a sketch was running.
    pub fn cleanup(&self)
      -> Result<oneshot::Receiver<bool>, Error>
    {   let (reply, reply_rx) = oneshot::channel();
        self.send(BackendCommand::Cleanup { reply })?;
        Ok(reply_rx)
    }

    /// Gracefully shutdown the backend.
    /// The running sketch, if any, is left in place.
    pub async fn shutdown(self) -> Result<(), Error>
    {   debug!("Shutting down SketchBackend");
        let (reply, reply_rx) = oneshot::channel();
        self.send(BackendCommand::Shutdown { reply })?;

        reply_rx.await.map_err(|_| {
          error!("Backend stopped before confirming shutdown");
          Error::Other("Backend already shutdown".to_string())
        })
    }

    fn send(&self, cmd: BackendCommand) -> Result<(), Error>
    {   self.tx.send(cmd).map_err(|_| {
          error!("Backend channel closed");
          Error::Other("Backend disconnected".to_string())
        })
    }
}

/// Main backend event loop
async fn run_backend_loop<C>(
  mut rx: mpsc::UnboundedReceiver<BackendCommand>
, mut state: SketchBackendState<C>
)
where C: GenerationClient
{   debug!("Starting SketchBackend event loop");

    loop
    { match rx.recv().await
      {   Some(BackendCommand::SubmitPrompt { prompt, reply }) => {
            trace!("Received SubmitPrompt: {}", prompt);
            let result = state.handle_submit(prompt).await;
            if reply.send(result).is_err()
            {   debug!("Prompt caller went away; reply dropped");
            }
          }
        , Some(BackendCommand::Cleanup { reply }) => {
            debug!("Received Cleanup");
            let _ = reply.send(state.manager.cleanup());
          }
        , Some(BackendCommand::Shutdown { reply }) => {
            // The running sketch stays on the page after exit
            state.manager.release();
            let _ = reply.send(());
            info!("SketchBackend shutting down");
            break;
          }
        , None => {
            debug!("Command channel closed");
            state.manager.release();
            break;
          }
      }
    }
}
