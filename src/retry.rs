//! Retry policy and exponential backoff around a generation client

use std::time::Duration;
use tokio::sync::mpsc;
use log::{debug, trace, error, info};

use crate::providers::GenerationClient;
use crate::request::{GenerationRequest, GenerationResult};

/// Retry policy for failed requests
#[derive(Debug, Clone)]
pub struct RetryPolicy
{   pub max_attempts: usize
  , pub backoff_multiplier: f32
  , pub initial_backoff: Duration
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_attempts: usize
    , backoff_multiplier: f32
    , initial_backoff_ms: u64
    ) -> Result<Self, crate::error::Error>
    {   if max_attempts == 0
        {   return Err(crate::error::Error::InvalidConfiguration(
              "max_attempts must be at least 1".to_string()
            ));
        }
        Ok(RetryPolicy
        {   max_attempts
          , backoff_multiplier
          , initial_backoff: Duration::from_millis(
              initial_backoff_ms
            )
        })
    }

    pub fn from_config(config: &crate::config::RetryConfig)
      -> Result<Self, crate::error::Error>
    {   RetryPolicy::new(
          config.max_attempts
        , config.backoff_multiplier
        , config.initial_backoff_ms
        )
    }

    /// Backoff before the retry that follows failed attempt `attempt`
    pub fn backoff_for_attempt(
      &self
    , attempt: usize
    ) -> Duration
    {   trace!("Calculating backoff for attempt {}", attempt);
        let multiplier
          = f64::from(self.backoff_multiplier).powi(attempt as i32);
        Duration::from_millis(
          (self.initial_backoff.as_millis() as f64
            * multiplier) as u64
        )
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy
        {   max_attempts: 3
          , backoff_multiplier: 2.0
          , initial_backoff: Duration::from_millis(1000)
        }
    }
}

/// Progress event sent once per retry, never on exhaustion
#[derive(Debug, Clone, PartialEq)]
pub struct RetryNotice
{   /// Number of attempts that have failed so far
    pub attempt: usize
  , pub max_attempts: usize
  , /// Wait before the next attempt
    pub delay: Duration
  , pub error: crate::error::Error
}

/// Failure counter for one generation call
#[derive(Debug, Clone)]
pub struct RetryState
{   attempts: usize
  , max_attempts: usize
}

impl RetryState
{   pub fn new(max_attempts: usize) -> Self
    {   RetryState
        {   attempts: 0
          , max_attempts
        }
    }

    pub fn attempts(&self) -> usize { self.attempts }

    /// Count one failure. Returns the attempt number and whether the
    /// budget is now spent.
    pub fn record_failure(&mut self) -> (usize, bool)
    {   self.attempts += 1;
        (self.attempts, self.attempts >= self.max_attempts)
    }
}

/// Call `client` until it succeeds or the policy's attempts run out.
///
/// Sleeps `policy.backoff_for_attempt(n)` after failed attempt `n`,
/// except after the last one. `observer` gets a [`RetryNotice`] per
/// retry; a closed or missing observer changes nothing.
pub async fn generate_with_retry<C>(
  client: &C
, request: &GenerationRequest
, policy: &RetryPolicy
, observer: Option<&mpsc::UnboundedSender<RetryNotice>>
) -> Result<GenerationResult, crate::error::Error>
where C: GenerationClient
{   let mut state = RetryState::new(policy.max_attempts);

    loop
    {   debug!(
          "Generation attempt {} of {}",
          state.attempts() + 1, policy.max_attempts
        );
        let err = match client.generate(request).await
        {   Ok(result) => {
              if state.attempts() > 0
              {   info!(
                    "Generation succeeded after {} failed attempts",
                    state.attempts()
                  );
              }
              return Ok(result);
            }
          , Err(e) => e
        };

        let (attempt, exhausted) = state.record_failure();
        error!("Attempt {} failed: {}", attempt, err);

        if exhausted
        {   return Err(crate::error::Error::RetryExhausted
            {   attempts: attempt
              , last: Box::new(err)
            });
        }

        let delay = policy.backoff_for_attempt(attempt);
        if let Some(tx) = observer
        {   let notice = RetryNotice
            {   attempt
              , max_attempts: policy.max_attempts
              , delay
              , error: err
            };
            if tx.send(notice).is_err()
            {   debug!("Retry observer closed; continuing");
            }
        }

        debug!("Backing off for {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
