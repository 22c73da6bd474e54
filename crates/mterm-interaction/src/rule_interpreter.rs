//! Offline interpreter backed by a table of request patterns.

use async_trait::async_trait;
use mterm_core::error::{MtermError, Result};
use mterm_core::interpreter::{Interpreter, ResolvedCommand, SessionContext};
use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

/// A file or directory name as it appears in a request.
const NAME: &str = r"([\w.\-/~]+)";

/// `(pattern, template)`; `{1}`, `{2}` are replaced by capture groups.
///
/// Order matters: the first matching pattern wins, so specific requests come
/// before the catch-all keywords.
const RULES: &[(&str, &str)] = &[
    // Creation
    (
        r"\b(?:create|make|add|new)\b.*\b(?:folder|directory)\b.*\b(?:called|named)\s+NAME",
        "mkdir {1}",
    ),
    (r"\bnew\s+(?:folder|directory)\s+NAME", "mkdir {1}"),
    (r"\b(?:create|make|add|new)\b.*\bfile\b.*\b(?:called|named)\s+NAME", "touch {1}"),
    (r"\bnew\s+file\s+NAME", "touch {1}"),
    // Move, copy, delete
    (r"\bmove\s+(?:the\s+)?(?:file\s+|folder\s+)?NAME\s+(?:in)?to\s+(?:the\s+)?NAME", "mv {1} {2}"),
    (r"\brename\s+(?:the\s+)?(?:file\s+|folder\s+)?NAME\s+to\s+NAME", "mv {1} {2}"),
    (r"\bcopy\s+(?:the\s+)?(?:file\s+)?NAME\s+(?:in)?to\s+(?:the\s+)?NAME", "cp {1} {2}"),
    (
        r"\bcopy\s+(?:the\s+)?(?:folder|directory)\s+NAME\s+(?:in)?to\s+(?:the\s+)?NAME",
        "cp -r {1} {2}",
    ),
    (r"\b(?:delete|remove)\s+(?:the\s+)?(?:folder|directory)\s+NAME", "rm -r {1}"),
    (r"\b(?:delete|remove)\s+(?:the\s+)?(?:file\s+)?NAME", "rm {1}"),
    // Reading and searching
    (r"\b(?:show|display|print|read)\b.*\bcontents?\s+of\s+(?:the\s+)?(?:file\s+)?NAME", "cat {1}"),
    (r"\b(?:show|display|print|read)\s+(?:me\s+)?(?:the\s+)?file\s+NAME", "cat {1}"),
    (r"\bedit\s+(?:the\s+)?(?:file\s+)?NAME", "edit {1}"),
    (r"\bsearch\s+for\s+'?([\w.\-]+)'?\s+in\s+NAME", "grep {1} {2}"),
    (r"\bfind\b.*\bfiles?\s+(?:called|named|containing)\s+NAME", "find {1}"),
    (r"\bfind\s+all\s+([\w.\-]+)\s+files\b", "find {1}"),
    // Navigation
    (
        r"\b(?:go|navigate|change\s+(?:the\s+)?directory|move)\s+(?:in)?to\s+(?:the\s+)?NAME",
        "cd {1}",
    ),
    (r"\bwhere\s+am\s+i\b", "pwd"),
    (r"\b(?:current|working)\s+(?:folder|directory)\b", "pwd"),
    // System
    (r"\bwho\s+am\s+i\b|\bcurrent\s+user\b|\busername\b", "whoami"),
    (r"\bprocess(?:es)?\b", "ps"),
    (r"\bcpu\b|\bprocessor\b", "cpu"),
    (r"\bmemory\b|\bram\b", "mem"),
    (r"\bdisk\b|\bstorage\s+space\b", "df"),
    (r"\btime\b|\bdate\b|\btoday\b", "date"),
    (r"\b(?:operating\s+)?system\b|\bos\s+version\b|\bkernel\b", "uname"),
    (r"\bclear\b.*\bscreen\b", "clear"),
    (r"\bcommand\s+history\b|\bwhat\s+did\s+i\s+run\b", "history"),
    // Listing last: "files" is common in more specific requests
    (r"\blist\b|\bwhat\b.*\bfiles\b|\bshow\b.*\b(?:files|folders)\b", "ls"),
    (r"\bhow\s+many\s+files\b|\bcount\s+files\b", "ls"),
];

struct Rule {
    pattern: Regex,
    template: &'static str,
}

fn rules() -> &'static [Rule] {
    static RULE_TABLE: OnceLock<Vec<Rule>> = OnceLock::new();
    RULE_TABLE.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(pattern, template)| {
                let source = pattern.replace("NAME", NAME);
                match RegexBuilder::new(&source).case_insensitive(true).build() {
                    Ok(pattern) => Some(Rule { pattern, template }),
                    Err(e) => {
                        tracing::error!("[RuleInterpreter] Invalid rule {:?}: {}", source, e);
                        None
                    }
                }
            })
            .collect()
    })
}

/// Maps common requests ("create a folder named reports") onto builtins.
///
/// When no rule matches it fails rather than guessing.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleInterpreter;

impl RuleInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Resolves `text` without any session context.
    pub fn resolve(&self, text: &str) -> Option<String> {
        let text = text.trim().trim_end_matches(['?', '.', '!']);
        rules().iter().find_map(|rule| {
            let captures = rule.pattern.captures(text)?;
            let mut command = rule.template.to_string();
            for (index, group) in captures.iter().enumerate().skip(1) {
                let value = group.map_or("", |m| m.as_str());
                command = command.replace(&format!("{{{index}}}"), value);
            }
            Some(command)
        })
    }
}

#[async_trait]
impl Interpreter for RuleInterpreter {
    fn name(&self) -> &str {
        "rules"
    }

    async fn interpret(&self, text: &str, _context: &SessionContext) -> Result<ResolvedCommand> {
        match self.resolve(text) {
            Some(command) => {
                tracing::debug!("[RuleInterpreter] {:?} -> {:?}", text, command);
                Ok(ResolvedCommand::new(command)
                    .with_explanation("matched a built-in request pattern"))
            }
            None => Err(MtermError::interpretation(text)),
        }
    }
}
