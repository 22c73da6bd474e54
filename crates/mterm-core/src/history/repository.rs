//! History repository trait.

use super::model::{HistoryEntry, NewHistoryEntry};
use crate::error::{MtermError, Result};
use crate::session::SessionId;
use std::collections::VecDeque;

/// Lazy scan over one session's persisted log, in sequence order.
///
/// Malformed records surface as `Err(MtermError::StoreCorruption)` items; the
/// iterator keeps going after them.
pub type HistoryIter = Box<dyn Iterator<Item = Result<HistoryEntry>> + Send>;

/// The tail of a log plus the records that had to be skipped to read it.
#[derive(Debug, Default)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub skipped: Vec<MtermError>,
}

/// Append-only, per-session command history.
pub trait HistoryRepository: Send + Sync {
    /// Appends `entry` with sequence number `last + 1`, where `last` is read
    /// under exclusive access to the session's log.
    fn append(&self, session_id: &SessionId, entry: NewHistoryEntry) -> Result<HistoryEntry>;

    /// Opens a fresh scan of the whole log. No cursor survives between calls.
    fn read_all(&self, session_id: &SessionId) -> Result<HistoryIter>;

    /// Removes a session's log. Removing a missing log is not an error.
    fn delete(&self, session_id: &SessionId) -> Result<()>;

    /// Last `limit` readable entries, oldest first.
    fn recent(&self, session_id: &SessionId, limit: usize) -> Result<HistoryPage> {
        let mut entries = VecDeque::with_capacity(limit.min(256));
        let mut skipped = Vec::new();
        for item in self.read_all(session_id)? {
            match item {
                Ok(entry) => {
                    if limit == 0 {
                        continue;
                    }
                    if entries.len() == limit {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
                Err(err) if err.is_corruption() => {
                    tracing::warn!("[History] Skipping record for {}: {}", session_id, err);
                    skipped.push(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(HistoryPage {
            entries: entries.into(),
            skipped,
        })
    }
}
