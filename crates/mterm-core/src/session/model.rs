//! Session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const SESSION_ID_PREFIX: &str = "session_";

/// Opaque, comparable session identifier.
///
/// Freshly allocated ids have the form `session_<n>`; any other string read
/// from disk is still a valid id, it just has no ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_ordinal(n: u64) -> Self {
        Self(format!("{SESSION_ID_PREFIX}{n}"))
    }

    /// The numeric suffix of a `session_<n>` id.
    pub fn ordinal(&self) -> Option<u64> {
        self.0.strip_prefix(SESSION_ID_PREFIX)?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A terminal session shared by every process that attaches to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub working_directory: PathBuf,
    pub command_count: u64,
}

impl Session {
    pub fn new(id: SessionId, working_directory: PathBuf, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_accessed_at: now,
            working_directory,
            command_count: 0,
        }
    }
}

/// A single mutation applied to a persisted session under its file lock.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    WorkingDirectory {
        path: PathBuf,
        at: DateTime<Utc>,
    },
    CommandRecorded {
        at: DateTime<Utc>,
    },
    Touched {
        at: DateTime<Utc>,
    },
}

impl SessionChange {
    pub fn apply(&self, session: &mut Session) {
        match self {
            SessionChange::WorkingDirectory { path, at } => {
                session.working_directory = path.clone();
                session.last_accessed_at = *at;
            }
            SessionChange::CommandRecorded { at } => {
                session.command_count += 1;
                session.last_accessed_at = *at;
            }
            SessionChange::Touched { at } => {
                session.last_accessed_at = *at;
            }
        }
    }
}

/// Aggregate numbers shown by the `stats` builtin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_commands: u64,
    pub oldest_session: Option<SessionId>,
    pub newest_session: Option<SessionId>,
}
