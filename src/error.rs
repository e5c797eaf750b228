use std::fmt;

/// Custom error type for sketchgen operations
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Prompt was empty or whitespace only
    EmptyPrompt
  , /// Network or transport failure before a response arrived
    Transport(String)
  , /// Endpoint answered with a non-success status
    Remote
    {   status: u16
      , message: String
    }
  , /// Success status but the body was unusable
    MalformedResponse(String)
  , /// Every attempt failed; carries the last failure
    RetryExhausted
    {   attempts: usize
      , last: Box<Error>
    }
  , /// Generated code failed to evaluate or produce a sketch
    RuntimeConstruction(String)
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Filesystem error
    Io(String)
  , /// Generic error
    Other(String)
}

impl Error
{   /// Innermost cause, looking through retry exhaustion
    pub fn root_cause(&self) -> &Error
    {   match self
        {   Error::RetryExhausted { last, .. } => last.root_cause()
          , other => other
        }
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::EmptyPrompt => {
              write!(f, "Prompt must not be empty")
            }
          , Error::Transport(msg) => {
              write!(f, "Network error: {}", msg)
            }
          , Error::Remote { status, message } => {
              write!(f,
                "API returned status {}: {}",
                status, message
              )
            }
          , Error::MalformedResponse(msg) => {
              write!(f,
                "Received an invalid response structure from the API: {}",
                msg
              )
            }
          , Error::RetryExhausted { attempts, last } => {
              write!(f,
                "Failed after {} attempts. {}",
                attempts, last
              )
            }
          , Error::RuntimeConstruction(msg) => {
              write!(f,
                "An error occurred while running the sketch: {}",
                msg
              )
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::Io(msg) => {
              write!(f, "I/O error: {}", msg)
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error
{   fn from(e: std::io::Error) -> Self
    {   Error::Io(e.to_string())
    }
}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}
