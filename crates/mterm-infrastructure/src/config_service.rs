//! Configuration service implementation.
//!
//! Loads the root configuration from `config.toml` (by default
//! `~/.config/mterm/config.toml`).

use crate::paths::MtermPaths;
use anyhow::Context;
use mterm_core::config::RootConfig;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Configuration service that loads and caches the root configuration.
///
/// A missing file yields defaults. A malformed file is reported with a warning
/// and also yields defaults, so a typo never locks the user out.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    config: Arc<RwLock<Option<RootConfig>>>,
}

impl ConfigService {
    /// A service reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// A service reading the platform default location.
    ///
    /// When that location cannot be determined every lookup yields defaults.
    pub fn default_location() -> Self {
        match MtermPaths::default_config_file() {
            Ok(path) => Self::new(path),
            Err(e) => {
                tracing::warn!("[ConfigService] {}; using built-in defaults", e);
                Self {
                    path: None,
                    config: Arc::new(RwLock::new(None)),
                }
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Gets the root configuration, loading from file if not cached.
    pub fn get_config(&self) -> RootConfig {
        {
            let cached = self.config.read().unwrap_or_else(|e| e.into_inner());
            if let Some(ref cached) = *cached {
                return cached.clone();
            }
        }

        let loaded = match self.path.as_deref().map(load_config).transpose() {
            Ok(found) => found.flatten().unwrap_or_default(),
            Err(e) => {
                tracing::warn!("[ConfigService] {:#}; using built-in defaults", e);
                RootConfig::default()
            }
        };

        let mut cache = self.config.write().unwrap_or_else(|e| e.into_inner());
        *cache = Some(loaded.clone());
        loaded
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut cache = self.config.write().unwrap_or_else(|e| e.into_inner());
        *cache = None;
    }
}

fn load_config(path: &Path) -> anyhow::Result<Option<RootConfig>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(config))
}
