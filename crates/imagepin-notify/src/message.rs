//! Queued notification messages.

use std::fmt;
use std::panic::Location;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Informational
    Info,
    /// Something looks wrong but work continues
    Warning,
    /// An operation failed
    Error,
}

impl Level {
    /// Short label used in chat messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification, stamped with time and call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Severity.
    pub level: Level,
    /// Text.
    pub text: String,
    /// When the message was created.
    pub time: DateTime<Utc>,
    /// Source file name (without directories) of the caller.
    pub file: String,
    /// Source line of the caller.
    pub line: u32,
}

impl Message {
    /// Creates a message stamped with the current time and the caller's
    /// location.
    #[must_use]
    #[track_caller]
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        let location = Location::caller();
        let file = Path::new(location.file())
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("???")
            .to_string();

        Self {
            level,
            text: text.into(),
            time: Utc::now(),
            file,
            line: location.line(),
        }
    }

    /// `file:line` of the call site.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}
