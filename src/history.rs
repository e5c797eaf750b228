//! Chat history persistence

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use log::{debug, trace};

use crate::hooks::Role;

/// One saved chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord
{   pub role: Role
  , pub text: String
  , #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>
  , pub user_id: String
  , pub created_at: DateTime<Utc>
}

impl ChatRecord
{   pub fn new(
      role: Role
    , text: impl Into<String>
    , code: Option<String>
    , user_id: impl Into<String>
    ) -> Self
    {   ChatRecord
        {   role
          , text: text.into()
          , code
          , user_id: user_id.into()
          , created_at: Utc::now()
        }
    }
}

/// Destination for chat records
pub trait MessageStore: Send + Sync
{   fn save_message(&self, record: &ChatRecord)
      -> Result<(), crate::error::Error>;
}

/// Discards everything
#[derive(Debug, Clone, Default)]
pub struct NullHistory;

impl MessageStore for NullHistory
{   fn save_message(&self, _record: &ChatRecord)
      -> Result<(), crate::error::Error>
    {   Ok(())
    }
}

/// Appends one JSON object per line
#[derive(Debug, Clone)]
pub struct JsonlHistory
{   path: PathBuf
}

impl JsonlHistory
{   pub fn new(path: impl Into<PathBuf>) -> Self
    {   JsonlHistory { path: path.into() }
    }

    pub fn path(&self) -> &Path
    {   &self.path
    }

    /// Read every record back, oldest first
    pub fn load(&self)
      -> Result<Vec<ChatRecord>, crate::error::Error>
    {   if !self.path.exists()
        {   return Ok(vec![]);
        }
        let content = fs::read_to_string(&self.path)?;
        content.lines()
          .filter(|line| !line.trim().is_empty())
          .map(|line| {
            serde_json::from_str(line).map_err(|e| {
              crate::error::Error::Other(format!(
                "corrupt history line in {}: {}",
                self.path.display(), e
              ))
            })
          })
          .collect()
    }
}

impl MessageStore for JsonlHistory
{   fn save_message(&self, record: &ChatRecord)
      -> Result<(), crate::error::Error>
    {   let line = serde_json::to_string(record)
          .map_err(|e| crate::error::Error::Other(e.to_string()))?;
        trace!("History line: {}", line);

        if let Some(parent) = self.path.parent()
        {   if !parent.as_os_str().is_empty()
            {   fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
          .create(true)
          .append(true)
          .open(&self.path)?;
        writeln!(file, "{}", line)?;
        debug!("Saved {} message to {}", record.role, self.path.display());
        Ok(())
    }
}
