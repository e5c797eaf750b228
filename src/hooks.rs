//! Collaborator seams: conversation surface and user identity

use serde::{Deserialize, Serialize};
use log::{info, error, debug};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   User
  , Model
}

impl std::fmt::Display for Role
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   match self
        {   Role::User => write!(f, "user")
          , Role::Model => write!(f, "model")
        }
    }
}

/// Where the conversation is shown. Calls are fire-and-forget.
pub trait ChatSurface: Send + Sync
{   /// Append a message (and its code, if any) to the conversation log
    fn append_message(&self, role: Role, text: &str, code: Option<&str>);

    /// Blocking-attention error display
    fn show_error(&self, message: &str);

    /// Toggle the input affordance; `true` disables it
    fn set_loading(&self, loading: bool);

    /// Replace the code panel contents
    fn show_code(&self, code: &str);
}

/// Identity of the person issuing prompts
pub trait Identity: Send + Sync
{   fn user_id(&self) -> String;
}

/// Fixed identity
#[derive(Debug, Clone)]
pub struct StaticIdentity
{   user_id: String
}

impl StaticIdentity
{   pub fn new(user_id: impl Into<String>) -> Self
    {   StaticIdentity { user_id: user_id.into() }
    }
}

impl Default for StaticIdentity
{   fn default() -> Self
    {   StaticIdentity::new("anonymous")
    }
}

impl Identity for StaticIdentity
{   fn user_id(&self) -> String
    {   self.user_id.clone()
    }
}

/// Surface that writes everything through the `log` facade
#[derive(Debug, Clone, Default)]
pub struct LogSurface;

impl ChatSurface for LogSurface
{   fn append_message(&self, role: Role, text: &str, code: Option<&str>)
    {   info!("[{}] {}", role, text);
        if let Some(code) = code
        {   debug!("[{}] code:\n{}", role, code);
        }
    }

    fn show_error(&self, message: &str)
    {   error!("{}", message);
    }

    fn set_loading(&self, loading: bool)
    {   debug!("loading: {}", loading);
    }

    fn show_code(&self, code: &str)
    {   info!("code:\n{}", code);
    }
}
