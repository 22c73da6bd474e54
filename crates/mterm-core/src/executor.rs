//! Executor contract for builtin and shell commands.

use crate::command::Invocation;
use crate::error::{MtermError, Result};
use crate::session::SessionId;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Where a command runs.
///
/// `cancel` fires when the router gives up on the command. Executors must
/// stop promptly once it fires and return [`MtermError::Cancelled`]; the
/// router keeps the command's lease until they do.
///
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub session_id: SessionId,
    pub working_directory: PathBuf,
    pub cancel: CancellationToken,
}

impl ExecContext {
    pub fn new(session_id: SessionId, working_directory: PathBuf) -> Self {
        Self {
            session_id,
            working_directory,
            cancel: CancellationToken::new(),
        }
    }

    /// Fails with `Cancelled` once the router has given up on the command.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(MtermError::cancelled("stopped before finishing"))
        } else {
            Ok(())
        }
    }
}

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub output: String,
    pub exit_status: i32,
}

impl ExecOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_status: 0,
        }
    }

    pub fn failed(output: impl Into<String>, exit_status: i32) -> Self {
        Self {
            output: output.into(),
            exit_status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Runs builtin invocations.
///
/// Errors are command failures, not store failures: an `Io` error from
/// `rm` of a missing file is reported to the user and recorded.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    fn handles(&self, invocation: &Invocation) -> bool;

    async fn execute(&self, invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome>;
}

/// Runs raw shell lines.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run(&self, command_line: &str, context: &ExecContext) -> Result<ExecOutcome>;
}
