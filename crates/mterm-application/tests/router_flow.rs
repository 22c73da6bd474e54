//! End-to-end passes through the router over a real on-disk store.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mterm_application::{CommandRouter, RouterOptions};
use mterm_core::clock::ManualClock;
use mterm_core::command::{BuiltinKind, ExecutableLookup, InputClassifier, Invocation};
use mterm_core::error::Result;
use mterm_core::executor::{ExecContext, ExecOutcome, Executor};
use mterm_core::history::{HistoryEntry, InputKind, OutcomeStatus};
use mterm_core::interpreter::{
    AlwaysConfirm, Confirmer, Interpreter, NeverConfirm, ResolvedCommand, SessionContext,
};
use mterm_core::lock::LockManager;
use mterm_core::session::SessionId;
use mterm_infrastructure::{DurableStore, MtermPaths};
use mterm_interaction::RuleInterpreter;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

struct NoExecutables;

impl ExecutableLookup for NoExecutables {
    fn is_executable(&self, _name: &str) -> bool {
        false
    }
}

/// Rule-based commands plus a canned conversation reply.
struct ChattyInterpreter;

#[async_trait]
impl Interpreter for ChattyInterpreter {
    fn name(&self) -> &str {
        "chatty"
    }

    async fn interpret(&self, text: &str, context: &SessionContext) -> Result<ResolvedCommand> {
        RuleInterpreter::new().interpret(text, context).await
    }

    async fn converse(&self, text: &str, _context: &SessionContext) -> Result<String> {
        Ok(format!("you said: {text}"))
    }
}

/// Takes over `touch` with blocking work that only stops once cancelled,
/// then needs a little longer to wind down.
struct StalledTouch {
    locks: Arc<dyn LockManager>,
    finish_anyway: bool,
    stopped: Arc<AtomicBool>,
    held_when_stopped: Arc<AtomicBool>,
}

impl StalledTouch {
    fn new(locks: Arc<dyn LockManager>, finish_anyway: bool) -> Self {
        Self {
            locks,
            finish_anyway,
            stopped: Arc::new(AtomicBool::new(false)),
            held_when_stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Executor for StalledTouch {
    fn name(&self) -> &str {
        "stalled"
    }

    fn handles(&self, invocation: &Invocation) -> bool {
        invocation.kind == BuiltinKind::Touch
    }

    async fn execute(
        &self,
        _invocation: &Invocation,
        context: &ExecContext,
    ) -> Result<ExecOutcome> {
        let context = context.clone();
        let locks = self.locks.clone();
        let finish_anyway = self.finish_anyway;
        let stopped = self.stopped.clone();
        let held = self.held_when_stopped.clone();
        tokio::task::spawn_blocking(move || {
            while !context.cancel.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            std::thread::sleep(Duration::from_millis(50));
            held.store(!locks.list_live()?.is_empty(), Ordering::SeqCst);
            stopped.store(true, Ordering::SeqCst);
            if finish_anyway {
                Ok(ExecOutcome::ok("touched in the end"))
            } else {
                context.checkpoint().map(|_| ExecOutcome::ok("unreachable"))
            }
        })
        .await
        .unwrap()
    }
}

struct Harness {
    _data: TempDir,
    work: TempDir,
    store: DurableStore,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let data = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ));
    let store = DurableStore::open(
        MtermPaths::new(data.path()),
        Duration::from_secs(300),
        clock.clone(),
    )
    .unwrap();
    Harness {
        _data: data,
        work,
        store,
        clock,
    }
}

impl Harness {
    fn router_with(&self, confirmer: Arc<dyn Confirmer>, options: RouterOptions) -> CommandRouter {
        let router = CommandRouter::builder(&self.store)
            .classifier(InputClassifier::new(Arc::new(NoExecutables)))
            .interpreter(Arc::new(ChattyInterpreter))
            .confirmer(confirmer)
            .options(options)
            .fresh_session(true)
            .build()
            .unwrap();
        router
            .sessions()
            .update_working_directory(router.session_id(), self.work.path())
            .unwrap();
        router
    }

    fn router(&self) -> CommandRouter {
        self.router_with(Arc::new(AlwaysConfirm), RouterOptions::default())
    }

    fn entries(&self, id: &SessionId) -> Vec<HistoryEntry> {
        self.store.history.recent(id, 100).unwrap().entries
    }

    fn work(&self, name: &str) -> std::path::PathBuf {
        self.work.path().join(name)
    }

    fn canonical(&self, name: &str) -> std::path::PathBuf {
        std::fs::canonicalize(self.work(name)).unwrap()
    }
}

fn assert_exists(path: &Path) {
    assert!(path.exists(), "{} should exist", path.display());
}

#[tokio::test]
async fn test_held_path_blocks_other_session() {
    let h = harness();
    let holder = h.router();
    let mut other = h.router();
    std::fs::write(h.work("x"), "keep me").unwrap();

    let granted = h
        .store
        .locks
        .acquire(&h.canonical("x"), holder.session_id())
        .unwrap();
    assert!(granted.is_granted());

    let reply = other.handle_line("rm x").await.unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::Busy));
    assert!(reply.output.starts_with("Resource is being used by another session. Wait."));
    assert_exists(&h.work("x"));
    let entries = h.entries(other.session_id());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome.status, OutcomeStatus::Busy);
}

#[tokio::test]
async fn test_abandoned_lock_expires_after_ttl() {
    let h = harness();
    let holder = h.router();
    let mut other = h.router();
    std::fs::write(h.work("x"), "stale").unwrap();
    h.store
        .locks
        .acquire(&h.canonical("x"), holder.session_id())
        .unwrap();

    h.clock.advance(chrono::Duration::seconds(301));
    let reply = other.handle_line("rm x").await.unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::Success));
    assert!(!h.work("x").exists());
    assert!(h.store.locks.list_live().unwrap().is_empty());
}

#[tokio::test]
async fn test_natural_language_mkdir_records_one_entry() {
    let h = harness();
    let mut router = h.router();

    let reply = router
        .handle_line("create a folder named reports")
        .await
        .unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::Success));
    assert_eq!(reply.resolved_command.as_deref(), Some("mkdir reports"));
    assert!(h.work("reports").is_dir());

    let entries = h.entries(router.session_id());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].raw_input, "create a folder named reports");
    assert_eq!(entries[0].resolved_command.as_deref(), Some("mkdir reports"));
    assert_eq!(entries[0].kind, InputKind::NaturalLanguage);
    assert_eq!(entries[0].sequence_number, 1);
}

#[tokio::test]
async fn test_declined_interpretation_changes_nothing() {
    let h = harness();
    let mut router = h.router_with(Arc::new(NeverConfirm), RouterOptions::default());

    let reply = router
        .handle_line("create a folder named reports")
        .await
        .unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::Declined));
    assert!(!h.work("reports").exists());
    assert!(h.store.locks.list_live().unwrap().is_empty());
}

#[tokio::test]
async fn test_uninterpretable_request_runs_nothing() {
    let h = harness();
    let mut router = h.router();

    let reply = router.handle_line("frobnicate the widgets").await.unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::Uninterpretable));
    assert!(reply.output.starts_with("Could not interpret"));
    let entries = h.entries(router.session_id());
    assert_eq!(entries[0].resolved_command, None);
}

fn stalled_router(h: &Harness, stalled: Arc<StalledTouch>) -> CommandRouter {
    let options = RouterOptions {
        command_timeout: Duration::from_millis(100),
        ..RouterOptions::default()
    };
    let router = CommandRouter::builder(&h.store)
        .classifier(InputClassifier::new(Arc::new(NoExecutables)))
        .executor(stalled)
        .options(options)
        .fresh_session(true)
        .build()
        .unwrap();
    router
        .sessions()
        .update_working_directory(router.session_id(), h.work.path())
        .unwrap();
    router
}

#[tokio::test]
async fn test_timed_out_command_keeps_its_lease_until_the_work_stops() {
    let h = harness();
    let stalled = Arc::new(StalledTouch::new(h.store.locks.clone(), false));
    let mut router = stalled_router(&h, stalled.clone());

    let reply = router.handle_line("touch slow.txt").await.unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::TimedOut));
    assert!(stalled.stopped.load(Ordering::SeqCst));
    assert!(stalled.held_when_stopped.load(Ordering::SeqCst));
    assert!(h.store.locks.list_live().unwrap().is_empty());
    let entries = h.entries(router.session_id());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome.status, OutcomeStatus::TimedOut);
}

#[tokio::test]
async fn test_work_that_completes_after_the_limit_is_recorded_as_done() {
    let h = harness();
    let stalled = Arc::new(StalledTouch::new(h.store.locks.clone(), true));
    let mut router = stalled_router(&h, stalled.clone());

    let reply = router.handle_line("touch slow.txt").await.unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::Success));
    assert_eq!(reply.output, "touched in the end");
    assert!(h.store.locks.list_live().unwrap().is_empty());
}

#[tokio::test]
async fn test_timed_out_recursive_rm_stops_before_returning() {
    let h = harness();
    for d in 0..20 {
        let dir = h.work(&format!("big/d{d}"));
        std::fs::create_dir_all(&dir).unwrap();
        for f in 0..100 {
            std::fs::write(dir.join(format!("f{f}")), "x").unwrap();
        }
    }
    let mut router = h.router_with(
        Arc::new(AlwaysConfirm),
        RouterOptions {
            command_timeout: Duration::from_millis(1),
            ..RouterOptions::default()
        },
    );

    let reply = router.handle_line("rm -r big").await.unwrap();

    let count = || walk_count(&h.work("big"));
    let left = count();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(count(), left, "rm kept deleting after the router returned");
    match reply.status {
        Some(OutcomeStatus::TimedOut) => assert_exists(&h.work("big")),
        Some(OutcomeStatus::Success) => assert!(!h.work("big").exists()),
        other => panic!("unexpected status {other:?}"),
    }
    assert!(h.store.locks.list_live().unwrap().is_empty());
}

fn walk_count(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| 1 + walk_count(&e.path()))
            .sum(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn test_double_dash_operand_is_still_lock_gated() {
    let h = harness();
    let holder = h.router();
    let mut other = h.router();
    std::fs::write(h.work("-x"), "keep me").unwrap();
    h.store
        .locks
        .acquire(&h.canonical("-x"), holder.session_id())
        .unwrap();

    let reply = other.handle_line("rm -- -x").await.unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::Busy));
    assert_exists(&h.work("-x"));
}

#[tokio::test]
async fn test_exit_and_blank_lines_are_not_recorded() {
    let h = harness();
    let mut router = h.router();

    assert!(router.handle_line("   ").await.unwrap().status.is_none());
    assert!(router.handle_line("exit").await.unwrap().is_exit());

    assert!(h.entries(router.session_id()).is_empty());
}

#[tokio::test]
async fn test_newterm_records_to_the_session_it_was_typed_in() {
    let h = harness();
    let mut router = h.router();
    let first = router.session_id().clone();

    router.handle_line("newterm").await.unwrap();
    let second = router.session_id().clone();

    assert_ne!(first, second);
    assert_eq!(h.entries(&first).len(), 1);
    assert!(h.entries(&second).is_empty());

    let listed = router.handle_line("sessions").await.unwrap();
    assert!(listed.output.contains(first.as_str()));
    assert!(listed.output.contains(&format!("* {second}")));
}

#[tokio::test]
async fn test_switch_to_unknown_session_keeps_attachment() {
    let h = harness();
    let mut router = h.router();
    let attached = router.session_id().clone();

    let reply = router.handle_line("switch session_999").await.unwrap();

    assert!(!reply.is_success());
    assert_eq!(router.session_id(), &attached);
    assert_eq!(
        h.store.sessions.current_session_id().unwrap(),
        Some(attached)
    );
}

#[tokio::test]
async fn test_cd_validates_and_updates_working_directory() {
    let h = harness();
    let mut router = h.router();
    std::fs::create_dir(h.work("sub")).unwrap();
    std::fs::write(h.work("file.txt"), "").unwrap();

    let rejected = router.handle_line("cd file.txt").await.unwrap();
    assert_eq!(rejected.status, Some(OutcomeStatus::Rejected));

    router.handle_line("cd sub").await.unwrap();
    let pwd = router.handle_line("pwd").await.unwrap();
    assert_eq!(pwd.output, h.canonical("sub").display().to_string());

    let session = router.current_session().unwrap();
    assert_eq!(session.command_count, 3);
}

#[tokio::test]
async fn test_chat_mode_routes_free_text_to_conversation() {
    let h = harness();
    let mut router = h.router();

    router.handle_line("chat").await.unwrap();
    assert!(router.in_chat_mode());

    let reply = router.handle_line("hello there").await.unwrap();
    assert_eq!(reply.output, "you said: hello there");

    let left = router.handle_line("exit").await.unwrap();
    assert!(!left.is_exit());
    assert!(!router.in_chat_mode());

    let entries = h.entries(router.session_id());
    let kinds: Vec<InputKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![InputKind::Builtin, InputKind::Chat]);
}

#[tokio::test]
async fn test_history_builtin_lists_previous_lines() {
    let h = harness();
    let mut router = h.router();
    router.handle_line("echo one").await.unwrap();
    router.handle_line("echo two").await.unwrap();

    let reply = router.handle_line("history 1").await.unwrap();

    assert!(reply.output.contains("echo two"));
    assert!(!reply.output.contains("echo one"));
    let sequence: Vec<u64> = h
        .entries(router.session_id())
        .iter()
        .map(|e| e.sequence_number)
        .collect();
    assert_eq!(sequence, vec![1, 2, 3]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_lines_run_in_session_directory() {
    let h = harness();
    let mut router = h.router();
    std::fs::write(h.work("a.txt"), "hi").unwrap();

    let reply = router.handle_line("tr a-z A-Z < a.txt").await.unwrap();

    assert_eq!(reply.status, Some(OutcomeStatus::Success));
    assert_eq!(reply.output, "HI");
    assert_eq!(h.entries(router.session_id())[0].kind, InputKind::Shell);
}

#[tokio::test]
async fn test_recent_inputs_follow_the_attached_session() {
    let h = harness();
    let mut router = h.router();
    router.handle_line("mkdir a").await.unwrap();
    router.handle_line("pwd").await.unwrap();
    router.handle_line("mkdir a").await.unwrap();

    assert_eq!(router.recent_inputs(10).unwrap(), vec!["pwd", "mkdir a"]);
    assert_eq!(router.recent_inputs(1).unwrap(), vec!["mkdir a"]);

    router.handle_line("newterm").await.unwrap();
    assert!(router.recent_inputs(10).unwrap().is_empty());
}
