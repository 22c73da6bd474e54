//! The command router: one full classify, resolve, lock, execute and record
//! pass per input line.

use crate::reply::{ReplyAction, RouterReply};
use crate::session_commands;
use mterm_core::clock::Clock;
use mterm_core::command::{
    BuiltinKind, Classified, InputClassifier, Invocation, builtin_for, find_builtin,
};
use mterm_core::config::RouterConfig;
use mterm_core::error::{MtermError, Result};
use mterm_core::executor::{ExecContext, ExecOutcome, Executor, ShellRunner};
use mterm_core::history::{
    HistoryEntry, HistoryRepository, InputKind, NewHistoryEntry, Outcome, OutcomeStatus,
};
use mterm_core::interpreter::{
    Confirmer, Interpreter, NeverConfirm, ResolvedCommand, SessionContext,
};
use mterm_core::lock::{LockManager, ResourceLease};
use mterm_core::path::{absolutize, canonicalize_resource};
use mterm_core::session::{Session, SessionId, SessionManager};
use mterm_infrastructure::DurableStore;
use mterm_interaction::{
    FileOpsExecutor, RuleInterpreter, ShellExecutor, SystemMonitorExecutor,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_HISTORY_LINES: usize = 20;

/// Router tuning taken from `[router]` in the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterOptions {
    pub command_timeout: Duration,
    pub confirm_interpreted_mutations: bool,
    pub history_context: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for RouterOptions {
    fn from(config: &RouterConfig) -> Self {
        Self {
            command_timeout: Duration::from_secs(config.command_timeout_secs.max(1)),
            confirm_interpreted_mutations: config.confirm_interpreted_mutations,
            history_context: config.history_context,
        }
    }
}

/// How one line ended, before it is turned into a history outcome.
enum Step {
    Ran(ExecOutcome),
    Declined(String),
    Failed(MtermError),
}

impl From<Result<ExecOutcome>> for Step {
    fn from(result: Result<ExecOutcome>) -> Self {
        match result {
            Ok(outcome) => Step::Ran(outcome),
            Err(err) => Step::Failed(err),
        }
    }
}

impl Step {
    fn outcome(&self) -> Outcome {
        match self {
            Step::Ran(out) if out.is_success() => Outcome::success(&out.output),
            Step::Ran(out) if out.output.trim().is_empty() => Outcome::new(
                OutcomeStatus::Failure,
                &format!("exit status {}", out.exit_status),
            ),
            Step::Ran(out) => Outcome::new(OutcomeStatus::Failure, &out.output),
            Step::Declined(command) => {
                Outcome::new(OutcomeStatus::Declined, &format!("declined: {command}"))
            }
            Step::Failed(err) => Outcome::from_error(err),
        }
    }

    fn display(&self) -> String {
        match self {
            Step::Ran(out) => out.output.clone(),
            Step::Declined(_) => "Cancelled.".to_string(),
            Step::Failed(MtermError::ResourceBusy {
                path,
                held_by,
                expires_in_secs,
            }) => format!(
                "Resource is being used by another session. Wait.\n  \
                 {} is held by {} for another {}s",
                path.display(),
                held_by,
                expires_in_secs
            ),
            Step::Failed(err) => err.to_string(),
        }
    }
}

/// Splits store failures that must end the process from those shown to the
/// user and recorded.
fn recoverable<T>(result: Result<T>) -> Result<Result<T>> {
    match result {
        Err(err) if err.is_fatal() => Err(err),
        other => Ok(other),
    }
}

/// Drives every input line of one terminal.
///
/// The router is attached to one session at a time. Only that attachment,
/// the chat-mode flag and what the store persists survive between lines.
pub struct CommandRouter {
    sessions: SessionManager,
    history: Arc<dyn HistoryRepository>,
    locks: Arc<dyn LockManager>,
    clock: Arc<dyn Clock>,
    classifier: InputClassifier,
    interpreter: Arc<dyn Interpreter>,
    confirmer: Arc<dyn Confirmer>,
    executors: Vec<Arc<dyn Executor>>,
    shell: Arc<dyn ShellRunner>,
    options: RouterOptions,
    session_id: SessionId,
    chat_mode: bool,
}

impl CommandRouter {
    pub fn builder(store: &DurableStore) -> CommandRouterBuilder {
        CommandRouterBuilder::new(store)
    }

    /// The session lines are currently recorded to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn in_chat_mode(&self) -> bool {
        self.chat_mode
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The attached session as persisted right now.
    pub fn current_session(&mut self) -> Result<Session> {
        self.attached_session()
    }

    /// Raw input of the attached session's last `limit` recorded lines,
    /// oldest first, with duplicates of a later line dropped.
    pub fn recent_inputs(&self, limit: usize) -> Result<Vec<String>> {
        let page = self.history.recent(&self.session_id, limit)?;
        let mut inputs: Vec<String> = Vec::with_capacity(page.entries.len());
        for entry in page.entries.into_iter().rev() {
            if !inputs.contains(&entry.raw_input) {
                inputs.push(entry.raw_input);
            }
        }
        inputs.reverse();
        Ok(inputs)
    }

    /// Handles one input line.
    ///
    /// Command failures, contention and interpreter problems come back as a
    /// reply with a non-success status. Only store failures that make further
    /// work unsafe are returned as `Err`.
    pub async fn handle_line(&mut self, line: &str) -> Result<RouterReply> {
        let started = Instant::now();
        let timestamp = self.clock.now();
        let session = self.attached_session()?;
        let classified = self.classifier.classify(line);

        let mut action = ReplyAction::Continue;
        let (kind, resolved, step) = match classified {
            Classified::Empty => return Ok(RouterReply::idle()),
            Classified::Builtin(invocation) if invocation.kind == BuiltinKind::Exit => {
                if self.chat_mode {
                    self.chat_mode = false;
                    return Ok(RouterReply::notice("Left chat mode."));
                }
                return Ok(RouterReply::exit());
            }
            Classified::Builtin(invocation) => {
                if invocation.kind == BuiltinKind::Clear {
                    action = ReplyAction::ClearScreen;
                }
                let step = self.run_builtin(&session, &invocation).await?;
                (InputKind::Builtin, None, step)
            }
            _ if self.chat_mode => {
                let step = self.converse(&session, line.trim()).await?;
                (InputKind::Chat, None, step)
            }
            Classified::Shell(command_line) => {
                let step = self.run_shell(&session, &command_line).await;
                (InputKind::Shell, None, step)
            }
            Classified::NaturalLanguage(text) => {
                let (resolved, step) = self.run_interpreted(&session, &text).await?;
                (InputKind::NaturalLanguage, resolved, step)
            }
        };

        let entry = self.record(
            &session.id,
            NewHistoryEntry {
                timestamp,
                kind,
                raw_input: line.to_string(),
                resolved_command: resolved,
                outcome: step.outcome(),
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
        )?;

        Ok(RouterReply {
            output: step.display(),
            status: Some(entry.outcome.status),
            resolved_command: entry.resolved_command,
            action,
        })
    }

    /// Re-reads the attached session, reattaching through the pointer when it
    /// has been removed by another process.
    fn attached_session(&mut self) -> Result<Session> {
        match self.sessions.get(&self.session_id) {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => {
                tracing::warn!("[CommandRouter] Session {} disappeared", self.session_id);
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    "[CommandRouter] Session {} unreadable: {}",
                    self.session_id,
                    err
                );
            }
        }
        let session = self.sessions.current()?;
        self.session_id = session.id.clone();
        Ok(session)
    }

    fn record(&self, session_id: &SessionId, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let entry = self.history.append(session_id, entry)?;
        match self.sessions.record_command(session_id) {
            Ok(_) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    "[CommandRouter] Could not count command for {}: {}",
                    session_id,
                    err
                );
            }
        }
        tracing::debug!(
            "[CommandRouter] {} #{} {} -> {}",
            session_id,
            entry.sequence_number,
            entry.kind,
            entry.outcome.status
        );
        Ok(entry)
    }

    async fn run_builtin(&mut self, session: &Session, invocation: &Invocation) -> Result<Step> {
        if invocation.kind.is_session_command() {
            let result = recoverable(self.run_session_command(session, invocation))?;
            return Ok(result.into());
        }
        self.run_executor(session, invocation).await
    }

    /// Runs an executor-backed builtin under a lease on its target paths.
    async fn run_executor(&self, session: &Session, invocation: &Invocation) -> Result<Step> {
        let Some(executor) = self.executors.iter().find(|e| e.handles(invocation)) else {
            return Ok(Step::Failed(MtermError::internal(format!(
                "no executor handles {}",
                invocation.kind
            ))));
        };

        let mut targets: Vec<PathBuf> = Vec::new();
        for raw in invocation.target_paths() {
            match canonicalize_resource(&absolutize(raw, &session.working_directory)) {
                Ok(path) => targets.push(path),
                Err(err) => return Ok(Step::Failed(err)),
            }
        }

        let lease = if targets.is_empty() {
            None
        } else {
            match recoverable(ResourceLease::acquire_all(
                self.locks.clone(),
                &session.id,
                &targets,
            ))? {
                Ok(lease) => Some(lease),
                Err(err) => return Ok(Step::Failed(err)),
            }
        };

        let context = ExecContext::new(session.id.clone(), session.working_directory.clone());
        tracing::debug!(
            "[CommandRouter] {} runs {} via {}",
            session.id,
            invocation.command_line(),
            executor.name()
        );

        let step: Step = if invocation.kind.is_interactive() {
            executor.execute(invocation, &context).await.into()
        } else {
            let command_line = invocation.command_line();
            let task = executor.execute(invocation, &context);
            self.bounded(&command_line, &context, task).await
        };

        if let Some(lease) = lease {
            if let Err(err) = lease.release() {
                tracing::error!("[CommandRouter] Lease release failed: {}", err);
            }
        }
        Ok(step)
    }

    async fn run_shell(&self, session: &Session, command_line: &str) -> Step {
        let context = ExecContext::new(session.id.clone(), session.working_directory.clone());
        let task = self.shell.run(command_line, &context);
        self.bounded(command_line, &context, task).await
    }

    /// Runs `task` under the command timeout.
    ///
    /// On expiry the context is cancelled and the task is still awaited until
    /// it returns, so nothing the command does outlives the caller's lease.
    /// A task that finished its work despite the cancellation is reported
    /// with its real outcome.
    async fn bounded<F>(&self, command_line: &str, context: &ExecContext, task: F) -> Step
    where
        F: Future<Output = Result<ExecOutcome>>,
    {
        let mut task = std::pin::pin!(task);
        let limit = self.options.command_timeout;
        if let Ok(result) = tokio::time::timeout(limit, task.as_mut()).await {
            return result.into();
        }

        tracing::warn!(
            "[CommandRouter] '{}' exceeded {:?}; cancelling",
            command_line,
            limit
        );
        context.cancel.cancel();
        match task.await {
            Err(err) if err.is_cancelled() => {
                Step::Failed(MtermError::timeout(command_line, limit.as_secs()))
            }
            Ok(outcome) => {
                tracing::info!(
                    "[CommandRouter] '{}' finished after the time limit",
                    command_line
                );
                Step::Ran(outcome)
            }
            Err(err) => Step::Failed(err),
        }
    }

    /// Resolves free text through the interpreter, then runs the result as if
    /// it had been typed, after confirmation where required.
    async fn run_interpreted(
        &mut self,
        session: &Session,
        text: &str,
    ) -> Result<(Option<String>, Step)> {
        let context = self.session_context(session)?;
        let resolved = match self.interpreter.interpret(text, &context).await {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::info!(
                    "[CommandRouter] {} could not interpret '{}': {}",
                    self.interpreter.name(),
                    text,
                    err
                );
                return Ok((None, Step::Failed(err)));
            }
        };
        let command_line = resolved.command_line.trim().to_string();
        let resolved = ResolvedCommand {
            command_line: command_line.clone(),
            ..resolved
        };

        let step = match self.classifier.classify(&command_line) {
            Classified::Builtin(invocation)
                if matches!(invocation.kind, BuiltinKind::Exit | BuiltinKind::Chat) =>
            {
                Step::Failed(MtermError::interpretation(format!(
                    "'{command_line}' controls the terminal and must be typed"
                )))
            }
            Classified::Builtin(invocation) => {
                if invocation.kind.is_mutating() && !self.confirmed(&resolved) {
                    Step::Declined(command_line.clone())
                } else {
                    self.run_builtin(session, &invocation).await?
                }
            }
            Classified::Shell(shell_line) => {
                if !self.confirmed(&resolved) {
                    Step::Declined(command_line.clone())
                } else {
                    self.run_shell(session, &shell_line).await
                }
            }
            Classified::NaturalLanguage(_) | Classified::Empty => {
                Step::Failed(MtermError::interpretation(format!(
                    "'{command_line}' is not a runnable command"
                )))
            }
        };
        Ok((Some(command_line), step))
    }

    fn confirmed(&self, resolved: &ResolvedCommand) -> bool {
        if !self.options.confirm_interpreted_mutations {
            return true;
        }
        let approved = self.confirmer.confirm(resolved);
        if !approved {
            tracing::info!("[CommandRouter] Declined '{}'", resolved.command_line);
        }
        approved
    }

    async fn converse(&self, session: &Session, text: &str) -> Result<Step> {
        let context = self.session_context(session)?;
        let reply = self.interpreter.converse(text, &context).await;
        Ok(reply.map(ExecOutcome::ok).into())
    }

    fn session_context(&self, session: &Session) -> Result<SessionContext> {
        let recent_history = match self
            .history
            .recent(&session.id, self.options.history_context)
        {
            Ok(page) => page.entries,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!("[CommandRouter] No history context: {}", err);
                Vec::new()
            }
        };
        Ok(SessionContext {
            session_id: session.id.clone(),
            working_directory: session.working_directory.clone(),
            recent_history,
        })
    }

    /// Builtins that act on sessions and the terminal rather than the
    /// filesystem.
    fn run_session_command(
        &mut self,
        session: &Session,
        invocation: &Invocation,
    ) -> Result<ExecOutcome> {
        let args = invocation.positional();
        let usage = || {
            MtermError::validation(format!("usage: {}", builtin_for(invocation.kind).usage))
        };

        match invocation.kind {
            BuiltinKind::Cd => {
                let target = match args.as_slice() {
                    [] => absolutize("~", &session.working_directory),
                    [raw] => absolutize(raw, &session.working_directory),
                    _ => return Err(usage()),
                };
                let updated = self.sessions.update_working_directory(&session.id, &target)?;
                Ok(ExecOutcome::ok(updated.working_directory.display().to_string()))
            }
            BuiltinKind::Newterm => {
                if !args.is_empty() {
                    return Err(usage());
                }
                let created = self.sessions.create_session()?;
                self.session_id = created.id.clone();
                Ok(ExecOutcome::ok(format!(
                    "Created new session: {}\nSwitched to {}",
                    created.id, created.id
                )))
            }
            BuiltinKind::Sessions => {
                let sessions = self.sessions.list_sessions()?;
                Ok(ExecOutcome::ok(session_commands::format_sessions(
                    &sessions,
                    &self.session_id,
                )))
            }
            BuiltinKind::Switch => {
                let [raw] = args.as_slice() else {
                    return Err(usage());
                };
                let switched = self.sessions.switch(&SessionId::new(*raw))?;
                self.session_id = switched.id.clone();
                Ok(ExecOutcome::ok(format!(
                    "Switched to {} ({})",
                    switched.id,
                    switched.working_directory.display()
                )))
            }
            BuiltinKind::History => {
                let limit = match args.as_slice() {
                    [] => DEFAULT_HISTORY_LINES,
                    [n] => n.parse().map_err(|_| usage())?,
                    _ => return Err(usage()),
                };
                let page = self.history.recent(&session.id, limit)?;
                Ok(ExecOutcome::ok(session_commands::format_history(&page)))
            }
            BuiltinKind::Stats => {
                let stats = self.sessions.stats()?;
                Ok(ExecOutcome::ok(session_commands::format_stats(&stats)))
            }
            BuiltinKind::Locks => {
                let live = self.locks.list_live()?;
                Ok(ExecOutcome::ok(session_commands::format_locks(
                    &live,
                    &session.id,
                    self.clock.now(),
                )))
            }
            BuiltinKind::Help => match args.as_slice() {
                [] => Ok(ExecOutcome::ok(session_commands::format_help())),
                [name] => find_builtin(name)
                    .map(|command| {
                        ExecOutcome::ok(format!("{}\n  {}", command.usage, command.description))
                    })
                    .ok_or_else(|| MtermError::not_found("command", *name)),
                _ => Err(usage()),
            },
            BuiltinKind::Chat => {
                self.chat_mode = !self.chat_mode;
                let text = if self.chat_mode {
                    format!(
                        "Chat mode on ({}). Type 'chat' or 'exit' to leave.",
                        self.interpreter.name()
                    )
                } else {
                    "Chat mode off.".to_string()
                };
                Ok(ExecOutcome::ok(text))
            }
            BuiltinKind::Clear => Ok(ExecOutcome::ok("")),
            other => Err(MtermError::internal(format!(
                "{other} is not a session command"
            ))),
        }
    }
}

/// Assembles a [`CommandRouter`] over an open store.
///
/// Defaults: rule-based interpreter, no confirmation (every interpreted
/// mutation is declined), file and system executors, `sh -c` passthrough.
pub struct CommandRouterBuilder {
    sessions: SessionManager,
    history: Arc<dyn HistoryRepository>,
    locks: Arc<dyn LockManager>,
    clock: Arc<dyn Clock>,
    classifier: InputClassifier,
    interpreter: Arc<dyn Interpreter>,
    confirmer: Arc<dyn Confirmer>,
    executors: Vec<Arc<dyn Executor>>,
    shell: Arc<dyn ShellRunner>,
    options: RouterOptions,
    fresh_session: bool,
}

impl CommandRouterBuilder {
    fn new(store: &DurableStore) -> Self {
        Self {
            sessions: store.session_manager(),
            history: store.history.clone(),
            locks: store.locks.clone(),
            clock: store.clock.clone(),
            classifier: InputClassifier::default(),
            interpreter: Arc::new(RuleInterpreter::new()),
            confirmer: Arc::new(NeverConfirm),
            executors: vec![
                Arc::new(FileOpsExecutor::new()),
                Arc::new(SystemMonitorExecutor::new()),
            ],
            shell: Arc::new(ShellExecutor::default()),
            options: RouterOptions::default(),
            fresh_session: false,
        }
    }

    pub fn classifier(mut self, classifier: InputClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn interpreter(mut self, interpreter: Arc<dyn Interpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Adds an executor that is consulted before the ones already present.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(0, executor);
        self
    }

    pub fn shell(mut self, shell: Arc<dyn ShellRunner>) -> Self {
        self.shell = shell;
        self
    }

    pub fn options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    /// Start in a newly created session instead of the current one.
    pub fn fresh_session(mut self, fresh: bool) -> Self {
        self.fresh_session = fresh;
        self
    }

    /// Attaches to the current session (or a new one) and returns the router.
    pub fn build(self) -> Result<CommandRouter> {
        let session = if self.fresh_session {
            self.sessions.create_session()?
        } else {
            self.sessions.current()?
        };
        tracing::info!(
            "[CommandRouter] Attached to {} in {}",
            session.id,
            session.working_directory.display()
        );

        Ok(CommandRouter {
            sessions: self.sessions,
            history: self.history,
            locks: self.locks,
            clock: self.clock,
            classifier: self.classifier,
            interpreter: self.interpreter,
            confirmer: self.confirmer,
            executors: self.executors,
            shell: self.shell,
            options: self.options,
            session_id: session.id,
            chat_mode: false,
        })
    }
}
