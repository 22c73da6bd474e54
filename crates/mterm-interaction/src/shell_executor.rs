//! Passthrough of raw shell lines to the platform shell.

use async_trait::async_trait;
use mterm_core::error::{MtermError, Result};
use mterm_core::executor::{ExecContext, ExecOutcome, ShellRunner};
use tokio::process::Command;

/// Runs a line with `sh -c` (or `cmd /C` on Windows) in the session's
/// working directory, capturing stdout and stderr.
///
/// The child is killed when the context is cancelled or the future is
/// dropped.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    flag: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        if cfg!(windows) {
            Self::new("cmd", "/C")
        } else {
            Self::new("sh", "-c")
        }
    }
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }
}

#[async_trait]
impl ShellRunner for ShellExecutor {
    async fn run(&self, command_line: &str, context: &ExecContext) -> Result<ExecOutcome> {
        tracing::debug!(
            "[Shell] {} in {}",
            command_line,
            context.working_directory.display()
        );

        let child = Command::new(&self.shell)
            .arg(&self.flag)
            .arg(command_line)
            .current_dir(&context.working_directory)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            output = child => output
                .map_err(|e| MtermError::io(format!("failed to start {}: {}", self.shell, e)))?,
            _ = context.cancel.cancelled() => {
                tracing::debug!("[Shell] killed: {}", command_line);
                return Err(MtermError::cancelled(format!("killed '{command_line}'")));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        let text = text.trim_end_matches('\n').to_string();

        // Killed by a signal has no exit code
        let code = output.status.code().unwrap_or(-1);
        if code == 0 {
            return Ok(ExecOutcome::ok(text));
        }
        tracing::debug!("[Shell] exited with {}", code);
        Ok(ExecOutcome::failed(text, code))
    }
}
