//! Resource lock manager trait.

use super::model::{AcquireOutcome, ReleaseOutcome, ResourceLock};
use crate::error::Result;
use crate::session::SessionId;
use std::path::Path;

/// Path-keyed advisory locks shared by every session process.
///
/// Paths handed to these methods must already be canonical (see
/// [`crate::path::canonicalize_resource`]). Each call is one atomic
/// read-modify-write of the shared lock table.
pub trait LockManager: Send + Sync {
    /// Sweeps expired locks, then grants `path` to `session_id` unless a live
    /// lock is held by another session. Re-acquiring an owned lock refreshes
    /// its `acquired_at`.
    fn acquire(&self, path: &Path, session_id: &SessionId) -> Result<AcquireOutcome>;

    /// Releases `path` if `session_id` owns it. A missing lock is a no-op.
    fn release(&self, path: &Path, session_id: &SessionId) -> Result<ReleaseOutcome>;

    /// Removes every expired lock and returns how many were dropped.
    fn sweep_expired(&self) -> Result<usize>;

    /// Every lock that is live right now, sorted by path.
    fn list_live(&self) -> Result<Vec<ResourceLock>>;
}
