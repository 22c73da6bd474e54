//! RAII guard over a set of granted resource locks.

use super::manager::LockManager;
use super::model::{AcquireOutcome, ReleaseOutcome};
use crate::error::{MtermError, Result};
use crate::session::SessionId;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Holds resource locks for one command and releases them when dropped.
///
/// Locks are taken in sorted path order so two sessions locking overlapping
/// sets cannot interleave into a partial grant on both sides.
pub struct ResourceLease {
    manager: Arc<dyn LockManager>,
    owner: SessionId,
    paths: Vec<PathBuf>,
}

impl ResourceLease {
    /// Acquires every path or none of them.
    ///
    /// # Errors
    ///
    /// `ResourceBusy` naming the first contended path. Locks taken before the
    /// denial are released before returning.
    pub fn acquire_all(
        manager: Arc<dyn LockManager>,
        owner: &SessionId,
        paths: &[PathBuf],
    ) -> Result<Self> {
        let mut wanted = paths.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut lease = Self {
            manager,
            owner: owner.clone(),
            paths: Vec::with_capacity(wanted.len()),
        };

        for path in wanted {
            match lease.manager.acquire(&path, owner)? {
                AcquireOutcome::Granted(_) => lease.paths.push(path),
                AcquireOutcome::Denied {
                    held_by,
                    expires_in,
                } => {
                    tracing::info!(
                        "[ResourceLease] {} denied {} (held by {}, {}s left)",
                        owner,
                        path.display(),
                        held_by,
                        expires_in.as_secs()
                    );
                    // `lease` drops here and releases what was already granted.
                    return Err(MtermError::busy(
                        path,
                        held_by.as_str(),
                        expires_in.as_secs(),
                    ));
                }
            }
        }

        Ok(lease)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Releases every lock now and reports the first store error.
    pub fn release(mut self) -> Result<()> {
        let paths = std::mem::take(&mut self.paths);
        let mut first_err = None;
        for path in &paths {
            if let Err(err) = release_one(self.manager.as_ref(), path, &self.owner) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for ResourceLease {
    fn drop(&mut self) {
        for path in std::mem::take(&mut self.paths) {
            if let Err(err) = release_one(self.manager.as_ref(), &path, &self.owner) {
                tracing::error!(
                    "[ResourceLease] Failed to release {}: {}",
                    path.display(),
                    err
                );
            }
        }
    }
}

fn release_one(manager: &dyn LockManager, path: &Path, owner: &SessionId) -> Result<()> {
    match manager.release(path, owner)? {
        ReleaseOutcome::Released => Ok(()),
        ReleaseOutcome::NotOwner { held_by } => {
            // Our lock expired and another session took the path over.
            tracing::warn!(
                "[ResourceLease] {} lost {} to {} before release",
                owner,
                path.display(),
                held_by
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::ResourceLock;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    // In-memory lock table without expiry
    #[derive(Default)]
    struct MemoryLocks {
        held: Mutex<HashMap<PathBuf, SessionId>>,
    }

    impl LockManager for MemoryLocks {
        fn acquire(&self, path: &Path, session_id: &SessionId) -> Result<AcquireOutcome> {
            let mut held = self.held.lock().unwrap();
            match held.get(path) {
                Some(owner) if owner != session_id => Ok(AcquireOutcome::Denied {
                    held_by: owner.clone(),
                    expires_in: Duration::from_secs(42),
                }),
                _ => {
                    held.insert(path.to_path_buf(), session_id.clone());
                    Ok(AcquireOutcome::Granted(ResourceLock {
                        path: path.to_path_buf(),
                        owner: session_id.clone(),
                        acquired_at: chrono::Utc::now(),
                        ttl: Duration::from_secs(300),
                    }))
                }
            }
        }

        fn release(&self, path: &Path, session_id: &SessionId) -> Result<ReleaseOutcome> {
            let mut held = self.held.lock().unwrap();
            match held.get(path) {
                Some(owner) if owner != session_id => Ok(ReleaseOutcome::NotOwner {
                    held_by: owner.clone(),
                }),
                _ => {
                    held.remove(path);
                    Ok(ReleaseOutcome::Released)
                }
            }
        }

        fn sweep_expired(&self) -> Result<usize> {
            Ok(0)
        }

        fn list_live(&self) -> Result<Vec<ResourceLock>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn drop_releases_every_path() {
        let locks = Arc::new(MemoryLocks::default());
        let owner = SessionId::from_ordinal(1);
        let paths = vec![PathBuf::from("/b"), PathBuf::from("/a"), PathBuf::from("/a")];

        let lease = ResourceLease::acquire_all(locks.clone(), &owner, &paths).unwrap();
        assert_eq!(lease.paths(), &[PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(locks.held.lock().unwrap().len(), 2);

        drop(lease);
        assert!(locks.held.lock().unwrap().is_empty());
    }

    #[test]
    fn denial_rolls_back_partial_grants() {
        let locks = Arc::new(MemoryLocks::default());
        let other = SessionId::from_ordinal(2);
        locks
            .held
            .lock()
            .unwrap()
            .insert(PathBuf::from("/b"), other.clone());

        let err = ResourceLease::acquire_all(
            locks.clone(),
            &SessionId::from_ordinal(1),
            &[PathBuf::from("/a"), PathBuf::from("/b")],
        )
        .err()
        .unwrap();

        match err {
            MtermError::ResourceBusy {
                path,
                held_by,
                expires_in_secs,
            } => {
                assert_eq!(path, PathBuf::from("/b"));
                assert_eq!(held_by, "session_2");
                assert_eq!(expires_in_secs, 42);
            }
            other => panic!("expected ResourceBusy, got {other:?}"),
        }
        let held = locks.held.lock().unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held.get(Path::new("/b")), Some(&other));
    }
}
