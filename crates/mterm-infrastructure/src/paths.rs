//! Unified path management for mterm's durable store.
//!
//! # Directory Structure
//!
//! ```text
//! <data_dir>/                      # ~/.local/share/mterm by default
//! ├── current_session.toml         # Current-session pointer
//! ├── current_session.lock
//! ├── locks.toml                   # Resource lock table
//! ├── locks.lock
//! ├── sessions/
//! │   ├── registry.lock            # Serializes id allocation
//! │   ├── session_1.toml
//! │   └── session_1.lock
//! ├── history/
//! │   ├── session_1.jsonl
//! │   └── session_1.lock
//! └── logs/
//!     └── mterm.log.YYYY-MM-DD
//!
//! ~/.config/mterm/config.toml      # Optional configuration
//! ```

use std::path::{Path, PathBuf};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "MTERM_DATA_DIR";

const APP_DIR: &str = "mterm";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Platform data or config directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for mterm_core::MtermError {
    fn from(e: PathError) -> Self {
        mterm_core::MtermError::config(e.to_string())
    }
}

/// Every file location inside one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtermPaths {
    root: PathBuf,
}

impl MtermPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `MTERM_DATA_DIR` if set, otherwise the platform data directory.
    pub fn default_data_dir() -> Result<PathBuf, PathError> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// `config.toml` in the platform config directory.
    pub fn default_config_file() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR).join("config.toml"))
            .ok_or(PathError::HomeDirNotFound)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_session_file(&self) -> PathBuf {
        self.root.join("current_session.toml")
    }

    pub fn locks_file(&self) -> PathBuf {
        self.root.join("locks.toml")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn registry_lock(&self) -> PathBuf {
        self.sessions_dir().join("registry.lock")
    }

    pub fn session_file(&self, id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{id}.toml"))
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join("history")
    }

    pub fn history_file(&self, id: &str) -> PathBuf {
        self.history_dir().join(format!("{id}.jsonl"))
    }

    pub fn history_lock(&self, id: &str) -> PathBuf {
        self.history_dir().join(format!("{id}.lock"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Creates the directory skeleton.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.sessions_dir(), self.history_dir(), self.logs_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Whether `id` can name a file inside the store without escaping it.
pub fn is_storable_id(id: &str) -> bool {
    !id.is_empty()
        && id != "registry"
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_is_rooted() {
        let paths = MtermPaths::new("/data/mterm");
        assert_eq!(
            paths.session_file("session_2"),
            PathBuf::from("/data/mterm/sessions/session_2.toml")
        );
        assert_eq!(
            paths.history_lock("session_2"),
            PathBuf::from("/data/mterm/history/session_2.lock")
        );
        assert_eq!(paths.locks_file(), PathBuf::from("/data/mterm/locks.toml"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = MtermPaths::new(temp_dir.path().join("store"));
        paths.ensure_dirs().unwrap();
        assert!(paths.sessions_dir().is_dir());
        assert!(paths.history_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
    }

    #[test]
    fn test_storable_ids() {
        assert!(is_storable_id("session_12"));
        assert!(!is_storable_id("../etc/passwd"));
        assert!(!is_storable_id("a/b"));
        assert!(!is_storable_id(""));
        assert!(!is_storable_id("registry"));
    }
}
