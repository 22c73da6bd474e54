use std::borrow::Cow::{self, Borrowed, Owned};

use colored::Colorize;
use mterm_core::command::builtin_commands;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

/// rustyline helper: completes and highlights builtin command names, and
/// suggests the rest of a line from the session's earlier input.
#[derive(Clone)]
pub struct MtermHelper {
    commands: Vec<&'static str>,
    past: Vec<String>,
}

impl MtermHelper {
    pub fn new() -> Self {
        let mut commands: Vec<&'static str> =
            builtin_commands().iter().map(|c| c.name).collect();
        commands.sort_unstable();
        Self {
            commands,
            past: Vec::new(),
        }
    }

    /// Replaces the remembered input, oldest first.
    pub fn set_past(&mut self, past: Vec<String>) {
        self.past = past;
    }

    pub fn remember(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.past.retain(|p| p != line);
        self.past.push(line.to_string());
    }

    /// Most recent earlier input that extends `line`.
    fn suggestion<'a>(&'a self, line: &str) -> Option<&'a str> {
        if line.trim().is_empty() {
            return None;
        }
        self.past
            .iter()
            .rev()
            .find(|p| p.len() > line.len() && p.starts_with(line))
            .map(|p| &p[line.len()..])
    }

    /// Builtin names starting with the first word, while it is the only word.
    fn matches<'a>(&'a self, line: &'a str) -> impl Iterator<Item = &'static str> + 'a {
        let partial = line.trim_start();
        let single_word = !partial.is_empty() && !partial.contains(char::is_whitespace);
        self.commands
            .iter()
            .copied()
            .filter(move |cmd| single_word && cmd.starts_with(partial))
    }

    fn is_builtin(&self, word: &str) -> bool {
        self.commands.binary_search(&word).is_ok()
    }
}

impl Helper for MtermHelper {}

impl Completer for MtermHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        let start = line.len() - line.trim_start().len();
        let candidates = self
            .matches(line)
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Highlighter for MtermHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let trimmed = line.trim_start();
        let word_len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let (word, rest) = trimmed.split_at(word_len);
        if self.is_builtin(word) {
            let indent = &line[..line.len() - trimmed.len()];
            Owned(format!("{}{}{}", indent, word.bright_cyan(), rest))
        } else {
            Borrowed(line)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned(hint.bright_black().to_string())
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for MtermHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        if let Some(rest) = self.suggestion(line) {
            return Some(rest.to_string());
        }
        let partial = line.trim_start();
        self.matches(line)
            .find(|cmd| cmd.len() > partial.len())
            .map(|cmd| cmd[partial.len()..].to_string())
    }
}

impl Validator for MtermHelper {}
