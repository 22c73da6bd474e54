//! The durable store: every repository over one data directory.

use crate::jsonl_history_repository::JsonlHistoryRepository;
use crate::paths::MtermPaths;
use crate::toml_lock_table::TomlLockTable;
use crate::toml_session_repository::TomlSessionRepository;
use mterm_core::clock::Clock;
use mterm_core::error::Result;
use mterm_core::history::HistoryRepository;
use mterm_core::lock::LockManager;
use mterm_core::session::{SessionManager, SessionRepository};
use std::sync::Arc;
use std::time::Duration;

/// Shared handles to the on-disk store of one process.
#[derive(Clone)]
pub struct DurableStore {
    pub paths: MtermPaths,
    pub sessions: Arc<dyn SessionRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub locks: Arc<dyn LockManager>,
    pub clock: Arc<dyn Clock>,
}

impl DurableStore {
    /// Opens (creating if needed) the store at `paths`.
    pub fn open(paths: MtermPaths, lock_ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        paths.ensure_dirs()?;
        tracing::info!("[DurableStore] Opened {}", paths.root().display());

        Ok(Self {
            sessions: Arc::new(TomlSessionRepository::new(paths.clone())?),
            history: Arc::new(JsonlHistoryRepository::new(paths.clone())?),
            locks: Arc::new(TomlLockTable::new(&paths, lock_ttl, clock.clone())),
            paths,
            clock,
        })
    }

    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(
            self.sessions.clone(),
            self.history.clone(),
            self.clock.clone(),
        )
    }
}
