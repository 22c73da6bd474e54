//! Error types for mterm.

use std::path::PathBuf;
use thiserror::Error;

/// The shared error type for every mterm crate.
///
/// Variants map onto the recovery policy of the command router: everything
/// except [`MtermError::Io`] and [`MtermError::Internal`] is recovered at the
/// router boundary and shown to the user. Those two are fatal when they come
/// from the durable store.
#[derive(Error, Debug, Clone)]
pub enum MtermError {
    /// Unknown session, path or command
    #[error("{entity_type} not found: '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// A live resource lock is held by another session
    #[error("Resource is being used by another session. Wait.")]
    ResourceBusy {
        path: PathBuf,
        held_by: String,
        expires_in_secs: u64,
    },

    /// Bad path or argument; no state was changed
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Natural-language input could not be turned into a command
    #[error("Could not interpret: {0}")]
    InterpretationFailure(String),

    /// A persisted record is malformed
    #[error("Corrupt record in {location}: {message}")]
    StoreCorruption { location: String, message: String },

    /// An external command exceeded its time bound
    #[error("Command timed out after {timeout_secs}s: {command}")]
    ExternalTimeout { command: String, timeout_secs: u64 },

    /// An executor stopped early because its command was cancelled
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MtermError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn busy(
        path: impl Into<PathBuf>,
        held_by: impl Into<String>,
        expires_in_secs: u64,
    ) -> Self {
        Self::ResourceBusy {
            path: path.into(),
            held_by: held_by.into(),
            expires_in_secs,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn interpretation(message: impl Into<String>) -> Self {
        Self::InterpretationFailure(message.into())
    }

    pub fn corruption(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreCorruption {
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn timeout(command: impl Into<String>, timeout_secs: u64) -> Self {
        Self::ExternalTimeout {
            command: command.into(),
            timeout_secs,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::ResourceBusy { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::StoreCorruption { .. })
    }

    /// Errors that must terminate the session process when raised by the store.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Internal(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for MtermError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for MtermError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for MtermError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for MtermError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for MtermError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, MtermError>`.
pub type Result<T> = std::result::Result<T, MtermError>;
