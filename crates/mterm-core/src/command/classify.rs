//! Input classification.

use super::builtin::{BuiltinKind, find_builtin};
use crate::history::InputKind;
use std::sync::Arc;

/// Characters that only make sense to a shell.
const SHELL_OPERATORS: &[char] = &['|', '>', '<', '&', ';', '$', '`', '~'];

/// Words that mark a line as a request rather than a command, even when its
/// first word happens to be an executable (`which`, `time`, `make`, ...).
const PROSE_WORDS: &[&str] = &[
    "a", "an", "the", "named", "called", "to", "in", "into", "me", "my", "please", "all", "of",
    "for", "with", "what", "how", "show",
];

/// A parsed builtin command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: BuiltinKind,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(kind: BuiltinKind, args: Vec<String>) -> Self {
        Self { kind, args }
    }

    /// Splits the arguments into flag words and operands.
    ///
    /// `-` alone is an operand, and every word after `--` is an operand.
    pub fn split_args(&self) -> SplitArgs<'_> {
        let mut split = SplitArgs::default();
        let mut operands_only = false;
        for arg in &self.args {
            if operands_only || !arg.starts_with('-') || arg == "-" {
                split.operands.push(arg.as_str());
            } else if arg == "--" {
                operands_only = true;
            } else {
                split.flags.push(arg.as_str());
            }
        }
        split
    }

    /// Arguments that are not flags.
    pub fn positional(&self) -> Vec<&str> {
        self.split_args().operands
    }

    /// Paths this invocation mutates. Empty for read-only commands.
    pub fn target_paths(&self) -> Vec<&str> {
        if self.kind.is_mutating() {
            self.positional()
        } else {
            Vec::new()
        }
    }

    /// The invocation as a shell-quoted line.
    pub fn command_line(&self) -> String {
        let words = std::iter::once(self.kind.to_string()).chain(self.args.iter().cloned());
        let words: Vec<String> = words.collect();
        shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
    }
}

/// Flag words (`-rf`) and operands of one invocation, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitArgs<'a> {
    pub flags: Vec<&'a str>,
    pub operands: Vec<&'a str>,
}

/// Result of classifying one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Empty,
    Builtin(Invocation),
    Shell(String),
    NaturalLanguage(String),
}

impl Classified {
    pub fn input_kind(&self) -> Option<InputKind> {
        match self {
            Classified::Empty => None,
            Classified::Builtin(_) => Some(InputKind::Builtin),
            Classified::Shell(_) => Some(InputKind::Shell),
            Classified::NaturalLanguage(_) => Some(InputKind::NaturalLanguage),
        }
    }
}

/// Answers whether a word names an executable the shell could run.
pub trait ExecutableLookup: Send + Sync {
    fn is_executable(&self, name: &str) -> bool;
}

/// Looks executables up on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathLookup;

impl ExecutableLookup for PathLookup {
    fn is_executable(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

/// Splits a line into words with POSIX quoting, or on whitespace when the
/// quoting is unbalanced.
pub fn split_words(line: &str) -> Vec<String> {
    shlex::split(line)
        .unwrap_or_else(|| line.split_whitespace().map(str::to_string).collect())
}

/// Sorts input lines into builtin, shell and natural-language requests.
#[derive(Clone)]
pub struct InputClassifier {
    lookup: Arc<dyn ExecutableLookup>,
}

impl Default for InputClassifier {
    fn default() -> Self {
        Self::new(Arc::new(PathLookup))
    }
}

impl InputClassifier {
    pub fn new(lookup: Arc<dyn ExecutableLookup>) -> Self {
        Self { lookup }
    }

    /// Builtin by exact first word, then shell by operator or executable,
    /// then natural language.
    pub fn classify(&self, line: &str) -> Classified {
        let line = line.trim();
        if line.is_empty() {
            return Classified::Empty;
        }

        let words = split_words(line);
        let Some(first) = words.first() else {
            return Classified::Empty;
        };

        if let Some(builtin) = find_builtin(first) {
            return Classified::Builtin(Invocation::new(builtin.kind, words[1..].to_vec()));
        }

        if line.contains(SHELL_OPERATORS) || line.contains("&&") || line.contains("||") {
            return Classified::Shell(line.to_string());
        }

        if self.lookup.is_executable(first) && !looks_like_prose(line, &words) {
            return Classified::Shell(line.to_string());
        }

        Classified::NaturalLanguage(line.to_string())
    }
}

fn looks_like_prose(line: &str, words: &[String]) -> bool {
    line.contains('?')
        || words[1..]
            .iter()
            .any(|w| PROSE_WORDS.contains(&w.to_ascii_lowercase().as_str()))
}
