//! Session DTOs

use chrono::{DateTime, Utc};
use mterm_core::session::{Session, SessionId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const SESSION_RECORD_VERSION: &str = "1.0.0";

fn default_version() -> String {
    SESSION_RECORD_VERSION.to_string()
}

/// On-disk form of `sessions/<id>.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default = "default_version")]
    pub version: String,
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Older records predate access tracking
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub working_directory: PathBuf,
    #[serde(default)]
    pub command_count: u64,
}

impl From<&Session> for SessionRecord {
    fn from(session: &Session) -> Self {
        Self {
            version: default_version(),
            id: session.id.to_string(),
            created_at: session.created_at,
            last_accessed_at: Some(session.last_accessed_at),
            working_directory: session.working_directory.clone(),
            command_count: session.command_count,
        }
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Session {
            id: SessionId::new(record.id),
            created_at: record.created_at,
            last_accessed_at: record.last_accessed_at.unwrap_or(record.created_at),
            working_directory: record.working_directory,
            command_count: record.command_count,
        }
    }
}

// ============================================================================
// Current-session pointer
// ============================================================================

/// On-disk form of `current_session.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSessionRecord {
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_access_time_falls_back_to_creation() {
        let record: SessionRecord = toml::from_str(
            r#"
            id = "session_1"
            created_at = "2026-01-01T00:00:00Z"
            working_directory = "/home/user"
            "#,
        )
        .unwrap();
        let session: Session = record.into();
        assert_eq!(session.last_accessed_at, session.created_at);
        assert_eq!(session.command_count, 0);
    }
}
