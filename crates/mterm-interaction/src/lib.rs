//! Interpreters and executors for mterm.
//!
//! Interpreters turn natural-language requests into command lines; executors
//! run builtin invocations and raw shell lines.

pub mod fallback_interpreter;
pub mod file_ops;
pub mod openai_interpreter;
pub mod rule_interpreter;
pub mod shell_executor;
pub mod system_monitor;

pub use fallback_interpreter::FallbackInterpreter;
pub use file_ops::FileOpsExecutor;
pub use openai_interpreter::OpenAiInterpreter;
pub use rule_interpreter::RuleInterpreter;
pub use shell_executor::ShellExecutor;
pub use system_monitor::SystemMonitorExecutor;
