//! Natural-language interpreter and confirmation contracts.

use crate::error::{MtermError, Result};
use crate::history::HistoryEntry;
use crate::session::SessionId;
use async_trait::async_trait;
use std::path::PathBuf;

/// What an interpreter may know about the session it serves.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub working_directory: PathBuf,
    /// Recent entries, oldest first
    pub recent_history: Vec<HistoryEntry>,
}

/// A command line produced from a natural-language request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub command_line: String,
    pub explanation: Option<String>,
}

impl ResolvedCommand {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            explanation: None,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

/// Turns free text into a command line.
///
/// Unavailability (no endpoint, network failure, unusable reply) is reported
/// as `InterpretationFailure`, never as a panic.
#[async_trait]
pub trait Interpreter: Send + Sync {
    fn name(&self) -> &str;

    async fn interpret(&self, text: &str, context: &SessionContext) -> Result<ResolvedCommand>;

    /// Free-form reply used by chat mode.
    async fn converse(&self, text: &str, context: &SessionContext) -> Result<String> {
        let _ = (text, context);
        Err(MtermError::interpretation(format!(
            "{} does not support conversation",
            self.name()
        )))
    }
}

/// Asks the user before an interpreted mutating command runs.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, command: &ResolvedCommand) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl Confirmer for AlwaysConfirm {
    fn confirm(&self, _command: &ResolvedCommand) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NeverConfirm;

impl Confirmer for NeverConfirm {
    fn confirm(&self, _command: &ResolvedCommand) -> bool {
        false
    }
}
