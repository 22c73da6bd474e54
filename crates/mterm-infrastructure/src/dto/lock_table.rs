//! Resource lock table DTOs

use chrono::{DateTime, Utc};
use mterm_core::lock::ResourceLock;
use mterm_core::session::SessionId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// On-disk form of `locks.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockTableRecord {
    #[serde(default)]
    pub locks: Vec<LockRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub path: PathBuf,
    pub owner_session_id: String,
    pub acquired_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl From<&ResourceLock> for LockRecord {
    fn from(lock: &ResourceLock) -> Self {
        Self {
            path: lock.path.clone(),
            owner_session_id: lock.owner.to_string(),
            acquired_at: lock.acquired_at,
            ttl_secs: lock.ttl.as_secs(),
        }
    }
}

impl From<&LockRecord> for ResourceLock {
    fn from(record: &LockRecord) -> Self {
        ResourceLock {
            path: record.path.clone(),
            owner: SessionId::new(record.owner_session_id.clone()),
            acquired_at: record.acquired_at,
            ttl: Duration::from_secs(record.ttl_secs),
        }
    }
}
