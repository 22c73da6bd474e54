//! Cross-process exclusive access to one store record.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// An exclusive OS file lock held for one read-modify-write.
///
/// The lock file itself is never removed. Removing it while another process
/// is blocked on the old inode would let a third process lock a fresh file
/// and run alongside the waiter.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    lock_path: PathBuf,
}

impl StoreLock {
    /// Blocks until the exclusive lock on `lock_path` is held.
    pub fn acquire(lock_path: &Path) -> io::Result<Self> {
        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;
        file.lock_exclusive()?;

        Ok(Self {
            file,
            lock_path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(
                "[StoreLock] Failed to unlock {}: {}",
                self.lock_path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_lock_file_survives_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("nested/record.lock");

        let lock = StoreLock::acquire(&lock_path).unwrap();
        assert_eq!(lock.path(), lock_path);
        drop(lock);

        assert!(lock_path.exists());
        StoreLock::acquire(&lock_path).unwrap();
    }

    #[test]
    fn test_holders_never_overlap() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = Arc::new(temp_dir.path().join("record.lock"));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock_path = lock_path.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    // Each thread opens its own descriptor, like a separate process would.
                    let _lock = StoreLock::acquire(&lock_path).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
