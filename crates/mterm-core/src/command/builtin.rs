//! Builtin commands provided by the terminal.
//!
//! The table is built once on first access and cached for the lifetime of the
//! process. Classification matches the first token of a line against it.

use serde::Serialize;
use std::sync::OnceLock;
use strum::{Display, EnumString};

/// Every builtin the router knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinKind {
    // Files and directories
    Pwd,
    Ls,
    Cd,
    Mkdir,
    Touch,
    Rm,
    Cp,
    Mv,
    Cat,
    Find,
    Grep,
    Edit,
    // System
    Cpu,
    Mem,
    Ps,
    Df,
    Date,
    Whoami,
    Uname,
    Echo,
    Clear,
    // Sessions
    Newterm,
    Sessions,
    Switch,
    History,
    Stats,
    Locks,
    Help,
    Chat,
    Exit,
}

impl BuiltinKind {
    /// Commands that change the filesystem and must hold resource locks.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            BuiltinKind::Mkdir
                | BuiltinKind::Touch
                | BuiltinKind::Rm
                | BuiltinKind::Cp
                | BuiltinKind::Mv
                | BuiltinKind::Edit
        )
    }

    /// Commands that hand the terminal to a child process and so run without
    /// a time bound.
    pub fn is_interactive(self) -> bool {
        self == BuiltinKind::Edit
    }

    /// Commands the router handles itself rather than an executor.
    pub fn is_session_command(self) -> bool {
        matches!(
            self,
            BuiltinKind::Cd
                | BuiltinKind::Newterm
                | BuiltinKind::Sessions
                | BuiltinKind::Switch
                | BuiltinKind::History
                | BuiltinKind::Stats
                | BuiltinKind::Locks
                | BuiltinKind::Help
                | BuiltinKind::Chat
                | BuiltinKind::Exit
                | BuiltinKind::Clear
        )
    }
}

/// A builtin command and its help text.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltinCommand {
    pub kind: BuiltinKind,
    /// Command name as typed
    pub name: &'static str,
    /// Usage format (e.g., "help [command]")
    pub usage: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Optional description of expected arguments
    pub args: Option<&'static str>,
}

impl BuiltinCommand {
    pub const fn new(
        kind: BuiltinKind,
        name: &'static str,
        usage: &'static str,
        description: &'static str,
        args: Option<&'static str>,
    ) -> Self {
        Self {
            kind,
            name,
            usage,
            description,
            args,
        }
    }
}

static BUILTIN_COMMANDS: OnceLock<Vec<BuiltinCommand>> = OnceLock::new();

/// Returns all builtin commands, in help order.
pub fn builtin_commands() -> &'static [BuiltinCommand] {
    use BuiltinKind::*;
    BUILTIN_COMMANDS.get_or_init(|| {
        vec![
            BuiltinCommand::new(Pwd, "pwd", "pwd", "Print the session's working directory", None),
            BuiltinCommand::new(
                Ls,
                "ls",
                "ls [-a] [-l] [path]",
                "List directory contents",
                Some("-a include hidden entries, -l show size and kind"),
            ),
            BuiltinCommand::new(
                Cd,
                "cd",
                "cd [path]",
                "Change the session's working directory",
                Some("Target directory; defaults to the home directory"),
            ),
            BuiltinCommand::new(
                Mkdir,
                "mkdir",
                "mkdir <dir>...",
                "Create directories, including missing parents",
                None,
            ),
            BuiltinCommand::new(
                Touch,
                "touch",
                "touch <file>...",
                "Create empty files or update their modification time",
                None,
            ),
            BuiltinCommand::new(
                Rm,
                "rm",
                "rm [-r] <path>...",
                "Remove files, or directories with -r",
                Some("-r remove directories recursively"),
            ),
            BuiltinCommand::new(Cp, "cp", "cp [-r] <src> <dst>", "Copy a file or directory", None),
            BuiltinCommand::new(
                Mv,
                "mv",
                "mv <src> <dst>",
                "Move or rename a file or directory",
                None,
            ),
            BuiltinCommand::new(Cat, "cat", "cat <file>...", "Print file contents", None),
            BuiltinCommand::new(
                Find,
                "find",
                "find [dir] <pattern>",
                "Find files and directories whose name contains the pattern",
                Some("Directory to search (default .) and a case-insensitive name fragment"),
            ),
            BuiltinCommand::new(
                Grep,
                "grep",
                "grep [-i] <regex> <path>...",
                "Search file contents with a regular expression",
                Some("-i case-insensitive"),
            ),
            BuiltinCommand::new(
                Edit,
                "edit",
                "edit <file>",
                "Open a file in $EDITOR (falls back to vi or notepad)",
                None,
            ),
            BuiltinCommand::new(Cpu, "cpu", "cpu", "Show CPU usage", None),
            BuiltinCommand::new(Mem, "mem", "mem", "Show memory usage", None),
            BuiltinCommand::new(
                Ps,
                "ps",
                "ps [n]",
                "List processes by memory usage",
                Some("Number of processes to show (default 15)"),
            ),
            BuiltinCommand::new(Df, "df", "df", "Show disk usage", None),
            BuiltinCommand::new(Date, "date", "date", "Show the current date and time", None),
            BuiltinCommand::new(Whoami, "whoami", "whoami", "Show the current user", None),
            BuiltinCommand::new(Uname, "uname", "uname", "Show operating system information", None),
            BuiltinCommand::new(Echo, "echo", "echo [text]...", "Print the arguments", None),
            BuiltinCommand::new(Clear, "clear", "clear", "Clear the screen", None),
            BuiltinCommand::new(
                Newterm,
                "newterm",
                "newterm",
                "Start a new session and switch to it",
                None,
            ),
            BuiltinCommand::new(Sessions, "sessions", "sessions", "List all sessions", None),
            BuiltinCommand::new(
                Switch,
                "switch",
                "switch <session_id>",
                "Switch to another session",
                Some("Session id as shown by `sessions`"),
            ),
            BuiltinCommand::new(
                History,
                "history",
                "history [n]",
                "Show this session's command history",
                Some("Number of entries to show (default 20)"),
            ),
            BuiltinCommand::new(Stats, "stats", "stats", "Show session statistics", None),
            BuiltinCommand::new(Locks, "locks", "locks", "Show live resource locks", None),
            BuiltinCommand::new(
                Help,
                "help",
                "help [command]",
                "Show available commands and their usage",
                Some("Optional command name to show detailed help"),
            ),
            BuiltinCommand::new(
                Chat,
                "chat",
                "chat",
                "Toggle conversation mode with the interpreter",
                None,
            ),
            BuiltinCommand::new(
                Exit,
                "exit",
                "exit",
                "Leave chat mode,
                or quit the terminal",
                None,
            ),
        ]
    })
}

/// Find a builtin command by name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinCommand> {
    builtin_commands().iter().find(|cmd| cmd.name == name)
}

/// The table entry for `kind`.
pub fn builtin_for(kind: BuiltinKind) -> &'static BuiltinCommand {
    builtin_commands()
        .iter()
        .find(|cmd| cmd.kind == kind)
        .unwrap_or_else(|| unreachable!("builtin table covers every BuiltinKind"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_builtin_commands_initialized() {
        let commands = builtin_commands();
        assert_eq!(commands.len(), 30);
        assert!(commands.iter().any(|c| c.name == "help"));
        assert!(commands.iter().any(|c| c.name == "newterm"));
    }

    #[test]
    fn test_names_match_kinds() {
        for cmd in builtin_commands() {
            assert_eq!(cmd.kind.to_string(), cmd.name);
            assert_eq!(BuiltinKind::from_str(cmd.name).unwrap(), cmd.kind);
            assert!(cmd.usage.starts_with(cmd.name));
        }
    }

    #[test]
    fn test_find_builtin() {
        assert_eq!(find_builtin("mkdir").unwrap().kind, BuiltinKind::Mkdir);
        assert!(find_builtin("MKDIR").is_none());
        assert!(find_builtin("nonexistent").is_none());
    }

    #[test]
    fn test_mutating_set() {
        let mutating: Vec<&str> = builtin_commands()
            .iter()
            .filter(|c| c.kind.is_mutating())
            .map(|c| c.name)
            .collect();
        assert_eq!(mutating, vec!["mkdir", "touch", "rm", "cp", "mv", "edit"]);
    }
}
