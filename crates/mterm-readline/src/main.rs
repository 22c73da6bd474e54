mod confirm;
mod helper;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;

use mterm_application::{CommandRouter, ReplyAction, RouterOptions, RouterReply};
use mterm_core::clock::{Clock, SystemClock};
use mterm_core::config::{InterpreterConfig, RootConfig};
use mterm_core::history::OutcomeStatus;
use mterm_core::interpreter::Interpreter;
use mterm_infrastructure::paths::DATA_DIR_ENV;
use mterm_infrastructure::{ConfigService, DurableStore, MtermPaths};
use mterm_interaction::{FallbackInterpreter, OpenAiInterpreter, RuleInterpreter};

use crate::confirm::PromptConfirmer;
use crate::helper::MtermHelper;

/// Earlier lines of the attached session loaded for recall and suggestions.
const RECALLED_LINES: usize = 500;

/// A command terminal whose sessions share history and lock files across
/// processes.
#[derive(Parser, Debug)]
#[command(name = "mterm")]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding sessions, history and the lock table
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Path to config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Start in a new session instead of the current one
    #[arg(long)]
    new: bool,

    /// Delete sessions idle for more than DAYS days, then exit
    #[arg(long, value_name = "DAYS")]
    prune_days: Option<u32>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// `--data-dir`, then `MTERM_DATA_DIR`, then `[store] data_dir`, then the
/// platform data directory.
fn resolve_data_dir(args: &Args, config: &RootConfig) -> Result<PathBuf> {
    if let Some(dir) = &args.data_dir {
        return Ok(dir.clone());
    }
    if std::env::var_os(DATA_DIR_ENV).is_none() {
        if let Some(dir) = &config.store.data_dir {
            return Ok(dir.clone());
        }
    }
    Ok(MtermPaths::default_data_dir()?)
}

fn build_interpreter(config: &InterpreterConfig) -> Arc<dyn Interpreter> {
    let rules: Arc<dyn Interpreter> = Arc::new(RuleInterpreter::new());
    match OpenAiInterpreter::from_config(config) {
        Ok(Some(remote)) => {
            tracing::info!(
                "[mterm] Interpreter endpoint {}",
                config.endpoint.as_deref().unwrap_or("")
            );
            Arc::new(FallbackInterpreter::new(Arc::new(remote), rules))
        }
        Ok(None) => rules,
        Err(e) => {
            tracing::warn!("[mterm] Interpreter endpoint unusable ({}); using rules only", e);
            rules
        }
    }
}

/// The entry point for the mterm REPL.
///
/// Opens the durable store, attaches to the current session (or a new one
/// with `--new`) and feeds every line to the command router. A store failure
/// ends the process with a non-zero status.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_service = match &args.config {
        Some(path) => ConfigService::new(path),
        None => ConfigService::default_location(),
    };
    let config = config_service.get_config();

    let paths = MtermPaths::new(resolve_data_dir(&args, &config)?);
    let _log_guard = logging::init(&paths.logs_dir(), args.verbose);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = DurableStore::open(
        paths,
        Duration::from_secs(config.locks.ttl_secs),
        clock,
    )
    .context("failed to open the session store")?;

    if let Some(days) = args.prune_days {
        let removed = store
            .session_manager()
            .prune(chrono::Duration::days(i64::from(days)))
            .context("failed to prune sessions")?;
        for id in &removed {
            println!("Removed {id}");
        }
        println!("Pruned {} session(s)", removed.len());
        return Ok(());
    }

    let mut router = CommandRouter::builder(&store)
        .interpreter(build_interpreter(&config.interpreter))
        .confirmer(Arc::new(PromptConfirmer))
        .options(RouterOptions::from(&config.router))
        .fresh_session(args.new)
        .build()
        .context("failed to attach to a session")?;

    repl(&mut router).await
}

/// Seeds line recall (arrow keys, Ctrl-R) and suggestions with the attached
/// session's persisted input.
fn load_session_input(
    rl: &mut Editor<MtermHelper, DefaultHistory>,
    router: &CommandRouter,
) -> Result<()> {
    let inputs = router
        .recent_inputs(RECALLED_LINES)
        .context("session store failure")?;
    rl.clear_history()?;
    for input in &inputs {
        let _ = rl.add_history_entry(input.as_str());
    }
    if let Some(helper) = rl.helper_mut() {
        helper.set_past(inputs);
    }
    Ok(())
}

async fn repl(router: &mut CommandRouter) -> Result<()> {
    let mut rl: Editor<MtermHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(MtermHelper::new()));
    load_session_input(&mut rl, router)?;

    println!("{}", "=== mterm ===".bright_magenta().bold());
    println!(
        "{}",
        format!(
            "Attached to {}. Type 'help' for commands, Ctrl-R to search history, 'exit' to quit.",
            router.session_id()
        )
        .bright_black()
    );
    println!();

    loop {
        let prompt = prompt(router)?;
        match rl.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                    if let Some(helper) = rl.helper_mut() {
                        helper.remember(&line);
                    }
                }

                let attached = router.session_id().clone();
                let reply = router
                    .handle_line(&line)
                    .await
                    .context("session store failure")?;
                print_reply(&reply, router.in_chat_mode());
                if router.session_id() != &attached {
                    load_session_input(&mut rl, router)?;
                }

                match reply.action {
                    ReplyAction::Exit => {
                        println!("{}", "Goodbye!".bright_green());
                        break;
                    }
                    ReplyAction::ClearScreen => rl.clear_screen()?,
                    ReplyAction::Continue => {}
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'exit' to quit.".yellow());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye!".bright_green());
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

fn prompt(router: &mut CommandRouter) -> Result<String> {
    let session = router
        .current_session()
        .context("session store failure")?;
    let dir = display_dir(&session.working_directory);
    let mode = if router.in_chat_mode() { "[chat] " } else { "" };
    Ok(format!(
        "{}{}:{}> ",
        mode.bright_blue(),
        session.id.as_str().green(),
        dir.cyan()
    ))
}

/// Working directory with the home directory shortened to `~`.
fn display_dir(dir: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = dir.strip_prefix(&home) {
            return if rest.as_os_str().is_empty() {
                "~".to_string()
            } else {
                format!("~/{}", rest.display())
            };
        }
    }
    dir.display().to_string()
}

fn print_reply(reply: &RouterReply, chatting: bool) {
    if let Some(command) = &reply.resolved_command {
        println!("{}", format!("=> {command}").bright_black());
    }
    if reply.output.is_empty() {
        return;
    }
    let text = reply.output.as_str();
    let painted = match reply.status {
        None | Some(OutcomeStatus::Success) if chatting => text.bright_blue(),
        None | Some(OutcomeStatus::Success) => text.normal(),
        Some(OutcomeStatus::Busy) => text.yellow(),
        Some(OutcomeStatus::Declined) => text.bright_black(),
        Some(OutcomeStatus::Uninterpretable) => text.magenta(),
        Some(OutcomeStatus::Failure | OutcomeStatus::Rejected | OutcomeStatus::TimedOut) => {
            text.red()
        }
    };
    println!("{painted}");
}
