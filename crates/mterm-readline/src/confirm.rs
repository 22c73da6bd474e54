//! `[y/N]` confirmation on the terminal.

use colored::Colorize;
use mterm_core::interpreter::{Confirmer, ResolvedCommand};
use std::io::{self, BufRead, Write};

/// Asks on stdin before an interpreted command changes anything.
/// Anything but `y`/`yes` (including EOF) declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptConfirmer;

impl Confirmer for PromptConfirmer {
    fn confirm(&self, command: &ResolvedCommand) -> bool {
        if let Some(explanation) = &command.explanation {
            println!("{}", explanation.bright_black());
        }
        print!(
            "{} {} ",
            format!("Run `{}`?", command.command_line).yellow(),
            "[y/N]".bold()
        );
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_yes(&answer),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
