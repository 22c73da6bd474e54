//! TOML-based SessionRepository implementation

use crate::dto::{CurrentSessionRecord, SessionRecord};
use crate::paths::{MtermPaths, is_storable_id};
use crate::storage::{AtomicTomlFile, StoreLock};
use chrono::{DateTime, Utc};
use mterm_core::error::{MtermError, Result};
use mterm_core::session::{Session, SessionChange, SessionId, SessionRepository};
use std::fs;
use std::path::Path;

/// Stores each session as its own TOML file under `sessions/`.
///
/// ```text
/// data_dir/
/// ├── sessions/
/// │   ├── registry.lock
/// │   ├── session_1.toml
/// │   └── session_2.toml
/// └── current_session.toml
/// ```
///
/// Every mutation holds the record's own lock; id allocation holds the
/// registry lock so two processes never pick the same ordinal.
pub struct TomlSessionRepository {
    paths: MtermPaths,
}

impl TomlSessionRepository {
    /// Creates a repository rooted at `paths`, creating `sessions/` if needed.
    pub fn new(paths: MtermPaths) -> Result<Self> {
        fs::create_dir_all(paths.sessions_dir())?;
        Ok(Self { paths })
    }

    fn session_file(&self, id: &SessionId) -> AtomicTomlFile<SessionRecord> {
        AtomicTomlFile::new(self.paths.session_file(id.as_str()))
    }

    fn pointer_file(&self) -> AtomicTomlFile<CurrentSessionRecord> {
        AtomicTomlFile::new(self.paths.current_session_file())
    }

    /// Ids of every `*.toml` record in `sessions/`, readable or not.
    fn stored_ids(&self) -> Result<Vec<SessionId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.paths.sessions_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(SessionId::new(stem));
            }
        }
        Ok(ids)
    }

    fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        if !is_storable_id(id.as_str()) {
            return Ok(None);
        }
        Ok(self.session_file(id).load()?.map(Session::from))
    }
}

impl SessionRepository for TomlSessionRepository {
    fn create(&self, working_directory: &Path, now: DateTime<Utc>) -> Result<Session> {
        let _registry = StoreLock::acquire(&self.paths.registry_lock())?;

        let next = self
            .stored_ids()?
            .iter()
            .filter_map(SessionId::ordinal)
            .max()
            .unwrap_or(0)
            + 1;
        let session = Session::new(
            SessionId::from_ordinal(next),
            working_directory.to_path_buf(),
            now,
        );

        let file = self.session_file(&session.id);
        let _lock = file.lock()?;
        file.save(&SessionRecord::from(&session))?;

        tracing::debug!("[TomlSessionRepository] Allocated {}", session.id);
        Ok(session)
    }

    fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>> {
        self.load(id)
    }

    fn list_all(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for id in self.stored_ids()? {
            match self.load(&id) {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) if e.is_corruption() => {
                    tracing::warn!("[TomlSessionRepository] Skipping {}: {}", id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sessions)
    }

    fn update(&self, id: &SessionId, change: &SessionChange) -> Result<Session> {
        if !is_storable_id(id.as_str()) {
            return Err(MtermError::not_found("session", id.as_str()));
        }
        let file = self.session_file(id);
        let _lock = file.lock()?;

        let mut session: Session = file
            .load()?
            .map(Session::from)
            .ok_or_else(|| MtermError::not_found("session", id.as_str()))?;
        change.apply(&mut session);
        file.save(&SessionRecord::from(&session))?;

        Ok(session)
    }

    fn delete(&self, id: &SessionId) -> Result<()> {
        if !is_storable_id(id.as_str()) {
            return Ok(());
        }
        let file = self.session_file(id);
        let _lock = file.lock()?;
        match fs::remove_file(file.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn current_session_id(&self) -> Result<Option<SessionId>> {
        Ok(self
            .pointer_file()
            .load()?
            .map(|record| SessionId::new(record.session_id)))
    }

    fn set_current_session_id(&self, id: &SessionId) -> Result<()> {
        let file = self.pointer_file();
        let _lock = file.lock()?;
        file.save(&CurrentSessionRecord {
            session_id: id.to_string(),
        })?;
        Ok(())
    }
}
