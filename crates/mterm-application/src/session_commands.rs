//! Text rendering for the session builtins.

use chrono::{DateTime, Local, Utc};
use mterm_core::command::builtin_commands;
use mterm_core::history::HistoryPage;
use mterm_core::lock::ResourceLock;
use mterm_core::session::{Session, SessionId, SessionStats};

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One line per session; `*` marks the attached one.
pub fn format_sessions(sessions: &[Session], attached: &SessionId) -> String {
    if sessions.is_empty() {
        return "No sessions".to_string();
    }
    sessions
        .iter()
        .map(|s| {
            format!(
                "{} {:<12} created {}  {:>4} commands  {}",
                if &s.id == attached { "*" } else { " " },
                s.id,
                local(s.created_at),
                s.command_count,
                s.working_directory.display()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_history(page: &HistoryPage) -> String {
    let mut lines: Vec<String> = page
        .entries
        .iter()
        .map(|entry| {
            let resolved = entry
                .resolved_command
                .as_deref()
                .map(|c| format!(" => {c}"))
                .unwrap_or_default();
            format!(
                "{:>5}  {}  {}{}  [{}]",
                entry.sequence_number,
                local(entry.timestamp),
                entry.raw_input,
                resolved,
                entry.outcome.status
            )
        })
        .collect();

    if lines.is_empty() {
        lines.push("No history yet".to_string());
    }
    if !page.skipped.is_empty() {
        lines.push(format!("({} unreadable records skipped)", page.skipped.len()));
    }
    lines.join("\n")
}

pub fn format_stats(stats: &SessionStats) -> String {
    let id = |id: &Option<SessionId>| id.as_ref().map_or("-".to_string(), ToString::to_string);
    format!(
        "Sessions: {} ({} active in the last hour)\nCommands: {}\nOldest:   {}\nNewest:   {}",
        stats.total_sessions,
        stats.active_sessions,
        stats.total_commands,
        id(&stats.oldest_session),
        id(&stats.newest_session)
    )
}

pub fn format_locks(locks: &[ResourceLock], attached: &SessionId, now: DateTime<Utc>) -> String {
    if locks.is_empty() {
        return "No live locks".to_string();
    }
    locks
        .iter()
        .map(|lock| {
            let owner = if &lock.owner == attached {
                format!("{} (this session)", lock.owner)
            } else {
                lock.owner.to_string()
            };
            format!(
                "{}  held by {}  {}s left",
                lock.path.display(),
                owner,
                lock.remaining(now).as_secs()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_help() -> String {
    let mut lines = vec!["Commands:".to_string()];
    lines.extend(
        builtin_commands()
            .iter()
            .map(|c| format!("  {:<28} {}", c.usage, c.description)),
    );
    lines.push(String::new());
    lines.push("Anything else runs in the shell, or is interpreted as a request.".to_string());
    lines.join("\n")
}
