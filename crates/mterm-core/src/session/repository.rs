//! Session repository trait.
//!
//! Defines the interface for session persistence operations.

use super::model::{Session, SessionChange, SessionId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

/// An abstract repository for session records and the current-session pointer.
///
/// Implementations are shared by independent processes, so every
/// read-modify-write must hold an exclusive lock on the record it touches for
/// the duration of that single operation, never longer.
pub trait SessionRepository: Send + Sync {
    /// Allocates a fresh id that collides with no persisted session and
    /// persists a new record for it.
    ///
    /// Does not change the current-session pointer.
    fn create(&self, working_directory: &Path, now: DateTime<Utc>) -> Result<Session>;

    /// Finds a session by its ID.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Session))`: Session found
    /// - `Ok(None)`: Session not found
    /// - `Err(StoreCorruption)`: The record exists but cannot be parsed
    fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Lists every readable session. Malformed records are skipped.
    fn list_all(&self) -> Result<Vec<Session>>;

    /// Applies `change` to a persisted session under its lock and returns the
    /// updated record. Fails with `NotFound` if the session does not exist.
    fn update(&self, id: &SessionId, change: &SessionChange) -> Result<Session>;

    /// Deletes a session record. Deleting a missing session is not an error.
    fn delete(&self, id: &SessionId) -> Result<()>;

    /// Reads the current-session pointer.
    fn current_session_id(&self) -> Result<Option<SessionId>>;

    /// Atomically rewrites the current-session pointer.
    fn set_current_session_id(&self, id: &SessionId) -> Result<()>;
}
