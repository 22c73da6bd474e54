use super::model::{Session, SessionChange, SessionId, SessionStats};
use super::repository::SessionRepository;
use crate::clock::Clock;
use crate::error::{MtermError, Result};
use crate::history::HistoryRepository;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sessions touched within this window count as active in `stats`.
const ACTIVE_WINDOW_SECS: i64 = 3600;

/// Manages session identity, the current-session pointer and each session's
/// working directory.
///
/// `SessionManager` holds no session state of its own. Every call goes to the
/// repository, because other processes may have changed the store since the
/// last call.
#[derive(Clone)]
pub struct SessionManager {
    repository: Arc<dyn SessionRepository>,
    history: Arc<dyn HistoryRepository>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Creates a new `SessionManager`.
    ///
    /// # Arguments
    ///
    /// * `repository` - Session records and the current-session pointer
    /// * `history` - Needed so pruning removes a session's log with its record
    /// * `clock` - Source of creation and access timestamps
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        history: Arc<dyn HistoryRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            history,
            clock,
        }
    }

    /// Creates a session rooted at the process's current directory and makes
    /// it current. Falls back to the home directory when the current
    /// directory has been removed.
    pub fn create_session(&self) -> Result<Session> {
        let start = starting_directory(std::env::current_dir(), dirs::home_dir())?;
        self.create_session_in(&start)
    }

    /// Creates a session rooted at `working_directory` and makes it current.
    pub fn create_session_in(&self, working_directory: &Path) -> Result<Session> {
        let session = self
            .repository
            .create(working_directory, self.clock.now())?;
        self.repository.set_current_session_id(&session.id)?;
        tracing::info!(
            "[SessionManager] Created {} in {}",
            session.id,
            session.working_directory.display()
        );
        Ok(session)
    }

    /// All sessions, oldest first.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions = self.repository.list_all()?;
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.ordinal().cmp(&b.id.ordinal()))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(sessions)
    }

    pub fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        self.repository.find_by_id(id)
    }

    /// Points the current-session pointer at `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no persisted session has that id; the pointer is left
    /// untouched in that case.
    pub fn switch(&self, id: &SessionId) -> Result<Session> {
        if self.repository.find_by_id(id)?.is_none() {
            return Err(MtermError::not_found("session", id.as_str()));
        }
        self.repository.set_current_session_id(id)?;
        let session = self
            .repository
            .update(id, &SessionChange::Touched { at: self.clock.now() })?;
        tracing::info!("[SessionManager] Switched to {}", id);
        Ok(session)
    }

    /// Resolves the current-session pointer.
    ///
    /// A missing pointer, a pointer to a deleted session or an unreadable
    /// session record all fall back to a fresh session.
    pub fn current(&self) -> Result<Session> {
        let pointed = match self.repository.current_session_id() {
            Ok(pointed) => pointed,
            Err(err) if err.is_corruption() => {
                tracing::warn!("[SessionManager] Ignoring unreadable pointer: {}", err);
                None
            }
            Err(err) => return Err(err),
        };

        if let Some(id) = pointed {
            match self.repository.find_by_id(&id) {
                Ok(Some(session)) => return Ok(session),
                Ok(None) => {
                    tracing::warn!("[SessionManager] Current session {} no longer exists", id);
                }
                Err(err) if err.is_corruption() => {
                    tracing::warn!("[SessionManager] Current session {} unreadable: {}", id, err);
                }
                Err(err) => return Err(err),
            }
        }

        self.create_session()
    }

    /// Commits a new working directory after checking it is an existing
    /// directory. Nothing changes when validation fails.
    pub fn update_working_directory(&self, id: &SessionId, new_path: &Path) -> Result<Session> {
        let metadata = fs::metadata(new_path).map_err(|_| {
            MtermError::validation(format!("{}: no such directory", new_path.display()))
        })?;
        if !metadata.is_dir() {
            return Err(MtermError::validation(format!(
                "{}: not a directory",
                new_path.display()
            )));
        }
        let path = fs::canonicalize(new_path)?;
        self.repository.update(
            id,
            &SessionChange::WorkingDirectory {
                path,
                at: self.clock.now(),
            },
        )
    }

    /// Bumps the command counter after a line has been handled.
    pub fn record_command(&self, id: &SessionId) -> Result<Session> {
        self.repository
            .update(id, &SessionChange::CommandRecorded { at: self.clock.now() })
    }

    /// Deletes sessions not accessed within `older_than`, together with their
    /// history. The current session is never pruned.
    pub fn prune(&self, older_than: chrono::Duration) -> Result<Vec<SessionId>> {
        let cutoff = self.clock.now() - older_than;
        let current = match self.repository.current_session_id() {
            Ok(current) => current,
            Err(err) if err.is_corruption() => {
                tracing::warn!(
                    "[SessionManager] Not pruning: current session unknown ({})",
                    err
                );
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        let mut removed = Vec::new();

        for session in self.repository.list_all()? {
            if Some(&session.id) == current.as_ref() || session.last_accessed_at >= cutoff {
                continue;
            }
            self.history.delete(&session.id)?;
            self.repository.delete(&session.id)?;
            tracing::info!("[SessionManager] Pruned {}", session.id);
            removed.push(session.id);
        }

        Ok(removed)
    }

    pub fn stats(&self) -> Result<SessionStats> {
        let sessions = self.list_sessions()?;
        let active_since = self.clock.now() - chrono::Duration::seconds(ACTIVE_WINDOW_SECS);

        Ok(SessionStats {
            total_sessions: sessions.len(),
            active_sessions: sessions
                .iter()
                .filter(|s| s.last_accessed_at > active_since)
                .count(),
            total_commands: sessions.iter().map(|s| s.command_count).sum(),
            oldest_session: sessions.first().map(|s| s.id.clone()),
            newest_session: sessions.last().map(|s| s.id.clone()),
        })
    }
}

/// Where a new session starts: the process directory if it still exists,
/// else the home directory.
fn starting_directory(cwd: io::Result<PathBuf>, home: Option<PathBuf>) -> Result<PathBuf> {
    match cwd {
        Ok(cwd) => Ok(cwd),
        Err(err) => {
            let home = home.ok_or_else(|| {
                MtermError::validation(format!(
                    "current directory is unavailable ({err}) and no home directory is known"
                ))
            })?;
            tracing::warn!(
                "[SessionManager] Current directory unavailable ({}); starting in {}",
                err,
                home.display()
            );
            Ok(home)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_cwd_falls_back_to_home() {
        let gone = Err(io::Error::from(io::ErrorKind::NotFound));
        let start = starting_directory(gone, Some(PathBuf::from("/home/ada"))).unwrap();
        assert_eq!(start, PathBuf::from("/home/ada"));
    }

    #[test]
    fn test_removed_cwd_without_home_is_not_fatal() {
        let gone = Err(io::Error::from(io::ErrorKind::NotFound));
        let err = starting_directory(gone, None).unwrap_err();
        assert!(err.is_validation());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_live_cwd_wins() {
        let start =
            starting_directory(Ok(PathBuf::from("/srv/work")), Some(PathBuf::from("/home/ada")));
        assert_eq!(start.unwrap(), PathBuf::from("/srv/work"));
    }
}
