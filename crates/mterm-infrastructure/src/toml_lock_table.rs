//! Resource lock table persisted as `locks.toml`.

use crate::dto::{LockRecord, LockTableRecord};
use crate::paths::MtermPaths;
use crate::storage::{AtomicTomlError, AtomicTomlFile};
use chrono::{DateTime, Utc};
use mterm_core::clock::Clock;
use mterm_core::error::Result;
use mterm_core::lock::{AcquireOutcome, LockManager, ReleaseOutcome, ResourceLock};
use mterm_core::session::SessionId;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// The shared lock table.
///
/// Each operation is one read-check-write under the exclusive lock on
/// `locks.lock`, so acquirers in different processes are serialized.
pub struct TomlLockTable {
    file: AtomicTomlFile<LockTableRecord>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TomlLockTable {
    pub fn new(paths: &MtermPaths, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            file: AtomicTomlFile::new(paths.locks_file()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Runs `f` on the table under the file lock and writes the result back.
    ///
    /// An unreadable table is replaced by an empty one. Locks are advisory
    /// and TTL-bounded, so losing them is recoverable; refusing every
    /// mutation until someone repairs the file is not.
    fn with_table<R>(
        &self,
        f: impl FnOnce(&mut LockTableRecord, DateTime<Utc>) -> R,
    ) -> Result<R> {
        let _lock = self.file.lock()?;
        let mut table = match self.file.load() {
            Ok(table) => table.unwrap_or_default(),
            Err(e @ AtomicTomlError::ParseError { .. }) => {
                tracing::warn!("[LockTable] Discarding unreadable lock table: {}", e);
                LockTableRecord::default()
            }
            Err(e) => return Err(e.into()),
        };

        let result = f(&mut table, self.clock.now());
        self.file.save(&table)?;
        Ok(result)
    }

    fn read_table(&self) -> Result<LockTableRecord> {
        match self.file.load() {
            Ok(table) => Ok(table.unwrap_or_default()),
            Err(AtomicTomlError::ParseError { .. }) => Ok(LockTableRecord::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Drops expired records, returning how many went.
fn sweep(table: &mut LockTableRecord, now: DateTime<Utc>) -> usize {
    let before = table.locks.len();
    table
        .locks
        .retain(|record| ResourceLock::from(record).is_live(now));
    let swept = before - table.locks.len();
    if swept > 0 {
        tracing::debug!("[LockTable] Swept {} expired lock(s)", swept);
    }
    swept
}

impl LockManager for TomlLockTable {
    fn acquire(&self, path: &Path, session_id: &SessionId) -> Result<AcquireOutcome> {
        let ttl = self.ttl;
        self.with_table(|table, now| {
            sweep(table, now);

            if let Some(existing) = table.locks.iter_mut().find(|r| r.path == path) {
                if existing.owner_session_id != session_id.as_str() {
                    let held = ResourceLock::from(&*existing);
                    tracing::debug!(
                        "[LockTable] {} denied {} (held by {})",
                        session_id,
                        path.display(),
                        held.owner
                    );
                    return AcquireOutcome::Denied {
                        expires_in: held.remaining(now),
                        held_by: held.owner,
                    };
                }
                existing.acquired_at = now;
                existing.ttl_secs = ttl.as_secs();
                tracing::debug!("[LockTable] {} refreshed {}", session_id, path.display());
                return AcquireOutcome::Granted(ResourceLock::from(&*existing));
            }

            let lock = ResourceLock {
                path: path.to_path_buf(),
                owner: session_id.clone(),
                acquired_at: now,
                ttl,
            };
            table.locks.push(LockRecord::from(&lock));
            tracing::debug!("[LockTable] {} acquired {}", session_id, path.display());
            AcquireOutcome::Granted(lock)
        })
    }

    fn release(&self, path: &Path, session_id: &SessionId) -> Result<ReleaseOutcome> {
        self.with_table(|table, now| {
            let Some(index) = table.locks.iter().position(|r| r.path == path) else {
                return ReleaseOutcome::Released;
            };
            let record = &table.locks[index];
            if record.owner_session_id != session_id.as_str()
                && ResourceLock::from(record).is_live(now)
            {
                return ReleaseOutcome::NotOwner {
                    held_by: SessionId::new(record.owner_session_id.clone()),
                };
            }
            // Releasing someone else's expired lock is just an early sweep.
            table.locks.remove(index);
            tracing::debug!("[LockTable] {} released {}", session_id, path.display());
            ReleaseOutcome::Released
        })
    }

    fn sweep_expired(&self) -> Result<usize> {
        self.with_table(sweep)
    }

    fn list_live(&self) -> Result<Vec<ResourceLock>> {
        let now = self.clock.now();
        let mut live: Vec<ResourceLock> = self
            .read_table()?
            .locks
            .iter()
            .map(ResourceLock::from)
            .filter(|lock| lock.is_live(now))
            .collect();
        live.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mterm_core::clock::{ManualClock, SystemClock};
    use std::path::PathBuf;
    use std::thread;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(300);

    fn manual_table(dir: &TempDir) -> (TomlLockTable, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap(),
        ));
        let table = TomlLockTable::new(&MtermPaths::new(dir.path()), TTL, clock.clone());
        (table, clock)
    }

    fn a() -> SessionId {
        SessionId::from_ordinal(1)
    }

    fn b() -> SessionId {
        SessionId::from_ordinal(2)
    }

    #[test]
    fn test_other_session_is_denied_with_remaining_ttl() {
        let dir = TempDir::new().unwrap();
        let (table, clock) = manual_table(&dir);
        let path = Path::new("/tmp/x");

        assert!(table.acquire(path, &a()).unwrap().is_granted());
        clock.advance(chrono::Duration::seconds(100));

        match table.acquire(path, &b()).unwrap() {
            AcquireOutcome::Denied {
                held_by,
                expires_in,
            } => {
                assert_eq!(held_by, a());
                assert_eq!(expires_in, Duration::from_secs(200));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn test_lock_is_gone_at_exactly_ttl() {
        let dir = TempDir::new().unwrap();
        let (table, clock) = manual_table(&dir);
        let path = Path::new("/tmp/x");

        table.acquire(path, &a()).unwrap();
        clock.advance(chrono::Duration::seconds(299));
        assert_eq!(table.list_live().unwrap().len(), 1);

        clock.advance(chrono::Duration::seconds(1));
        assert!(table.list_live().unwrap().is_empty());
        assert!(table.acquire(path, &b()).unwrap().is_granted());
    }

    #[test]
    fn test_abandoned_lock_is_granted_after_ttl_plus_one_second() {
        let dir = TempDir::new().unwrap();
        let (table, clock) = manual_table(&dir);
        let path = Path::new("/tmp/x");

        table.acquire(path, &a()).unwrap();
        clock.advance(chrono::Duration::seconds(301));

        match table.acquire(path, &b()).unwrap() {
            AcquireOutcome::Granted(lock) => assert_eq!(lock.owner, b()),
            other => panic!("expected grant, got {other:?}"),
        }
    }

    #[test]
    fn test_reacquire_refreshes_expiry() {
        let dir = TempDir::new().unwrap();
        let (table, clock) = manual_table(&dir);
        let path = Path::new("/tmp/x");

        table.acquire(path, &a()).unwrap();
        clock.advance(chrono::Duration::seconds(200));
        let refreshed = match table.acquire(path, &a()).unwrap() {
            AcquireOutcome::Granted(lock) => lock,
            other => panic!("expected grant, got {other:?}"),
        };
        assert_eq!(refreshed.acquired_at, clock.now());

        // Past the original expiry but within the refreshed one.
        clock.advance(chrono::Duration::seconds(200));
        assert!(!table.acquire(path, &b()).unwrap().is_granted());
        assert_eq!(table.list_live().unwrap().len(), 1);
    }

    #[test]
    fn test_release_rules() {
        let dir = TempDir::new().unwrap();
        let (table, _clock) = manual_table(&dir);
        let path = Path::new("/tmp/x");

        assert_eq!(table.release(path, &a()).unwrap(), ReleaseOutcome::Released);

        table.acquire(path, &a()).unwrap();
        assert_eq!(
            table.release(path, &b()).unwrap(),
            ReleaseOutcome::NotOwner { held_by: a() }
        );
        assert_eq!(table.list_live().unwrap().len(), 1);

        assert_eq!(table.release(path, &a()).unwrap(), ReleaseOutcome::Released);
        assert!(table.list_live().unwrap().is_empty());
    }

    #[test]
    fn test_sweep_expired_counts_removed() {
        let dir = TempDir::new().unwrap();
        let (table, clock) = manual_table(&dir);

        table.acquire(Path::new("/tmp/old"), &a()).unwrap();
        clock.advance(chrono::Duration::seconds(250));
        table.acquire(Path::new("/tmp/new"), &b()).unwrap();
        clock.advance(chrono::Duration::seconds(60));

        assert_eq!(table.sweep_expired().unwrap(), 1);
        let live = table.list_live().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].path, PathBuf::from("/tmp/new"));
    }

    #[test]
    fn test_unreadable_table_is_reset() {
        let dir = TempDir::new().unwrap();
        let (table, _clock) = manual_table(&dir);
        std::fs::write(MtermPaths::new(dir.path()).locks_file(), "locks = 7").unwrap();

        assert!(table.list_live().unwrap().is_empty());
        assert!(table.acquire(Path::new("/tmp/x"), &a()).unwrap().is_granted());
        assert_eq!(table.list_live().unwrap().len(), 1);
    }

    #[test]
    fn test_at_most_one_live_holder_under_contention() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();

        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let root = root.clone();
                thread::spawn(move || {
                    // Independent handle per worker, as separate processes would have.
                    let table =
                        TomlLockTable::new(&MtermPaths::new(root), TTL, Arc::new(SystemClock));
                    table
                        .acquire(Path::new("/srv/shared"), &SessionId::from_ordinal(n))
                        .unwrap()
                        .is_granted()
                })
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();

        assert_eq!(granted, 1);
        let table = TomlLockTable::new(&MtermPaths::new(&root), TTL, Arc::new(SystemClock));
        assert_eq!(table.list_live().unwrap().len(), 1);
    }
}
