//! What the router hands back to the terminal after one line.

use mterm_core::history::OutcomeStatus;

/// What the terminal should do after printing a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAction {
    Continue,
    ClearScreen,
    Exit,
}

/// Result of handling one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterReply {
    /// Text to show the user. May be empty.
    pub output: String,
    /// Recorded outcome; `None` when the line was not recorded
    pub status: Option<OutcomeStatus>,
    /// Command line produced by the interpreter, if any
    pub resolved_command: Option<String>,
    pub action: ReplyAction,
}

impl RouterReply {
    pub(crate) fn idle() -> Self {
        Self::notice(String::new())
    }

    pub(crate) fn notice(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            status: None,
            resolved_command: None,
            action: ReplyAction::Continue,
        }
    }

    pub(crate) fn exit() -> Self {
        Self {
            action: ReplyAction::Exit,
            ..Self::idle()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_none_or(OutcomeStatus::is_success)
    }

    pub fn is_exit(&self) -> bool {
        self.action == ReplyAction::Exit
    }
}
