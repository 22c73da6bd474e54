//! System information builtins backed by `sysinfo`.

use async_trait::async_trait;
use mterm_core::command::{BuiltinKind, Invocation, builtin_for};
use mterm_core::error::{MtermError, Result};
use mterm_core::executor::{ExecContext, ExecOutcome, Executor};
use sysinfo::{Disks, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};

const DEFAULT_PROCESS_LIMIT: usize = 15;
const MIB: u64 = 1024 * 1024;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Answers cpu, mem, ps, df, date, whoami, uname and echo.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMonitorExecutor;

impl SystemMonitorExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for SystemMonitorExecutor {
    fn name(&self) -> &str {
        "system-monitor"
    }

    fn handles(&self, invocation: &Invocation) -> bool {
        use BuiltinKind::*;
        matches!(
            invocation.kind,
            Cpu | Mem | Ps | Df | Date | Whoami | Uname | Echo
        )
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        _context: &ExecContext,
    ) -> Result<ExecOutcome> {
        match invocation.kind {
            BuiltinKind::Echo => Ok(ExecOutcome::ok(invocation.args.join(" "))),
            BuiltinKind::Date => Ok(ExecOutcome::ok(
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            )),
            BuiltinKind::Whoami => Ok(ExecOutcome::ok(whoami::username())),
            BuiltinKind::Uname => Ok(ExecOutcome::ok(uname())),
            kind @ (BuiltinKind::Cpu | BuiltinKind::Mem | BuiltinKind::Ps | BuiltinKind::Df) => {
                let args = invocation.args.clone();
                // Sampling blocks the thread (cpu sleeps between two readings)
                tokio::task::spawn_blocking(move || sample(kind, &args))
                    .await
                    .map_err(|e| MtermError::internal(format!("system query aborted: {e}")))?
            }
            other => Err(MtermError::internal(format!(
                "{other} is not a system command"
            ))),
        }
    }
}

fn sample(kind: BuiltinKind, args: &[String]) -> Result<ExecOutcome> {
    match kind {
        BuiltinKind::Cpu => Ok(ExecOutcome::ok(cpu())),
        BuiltinKind::Mem => Ok(ExecOutcome::ok(mem())),
        BuiltinKind::Ps => {
            let limit = match args {
                [] => DEFAULT_PROCESS_LIMIT,
                [n] => n.parse().map_err(|_| usage(kind))?,
                _ => return Err(usage(kind)),
            };
            Ok(ExecOutcome::ok(ps(limit)))
        }
        BuiltinKind::Df => Ok(ExecOutcome::ok(df())),
        other => Err(MtermError::internal(format!("{other} has no sampler"))),
    }
}

fn usage(kind: BuiltinKind) -> MtermError {
    MtermError::validation(format!("usage: {}", builtin_for(kind).usage))
}

fn cpu() -> String {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();
    format!(
        "CPU Usage: {:.1}% ({} cores)",
        sys.global_cpu_usage(),
        sys.cpus().len()
    )
}

fn mem() -> String {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    let used = sys.used_memory();
    let percent = if total == 0 {
        0.0
    } else {
        used as f64 * 100.0 / total as f64
    };
    format!(
        "Memory Usage: {:.1}% ({} MB / {} MB)",
        percent,
        used / MIB,
        total / MIB
    )
}

fn ps(limit: usize) -> String {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::new()
            .with_memory()
            .with_user(UpdateKind::OnlyIfNotSet),
    );
    let users = Users::new_with_refreshed_list();

    let mut processes: Vec<_> = sys.processes().values().collect();
    processes.sort_by(|a, b| b.memory().cmp(&a.memory()).then(a.pid().cmp(&b.pid())));

    let mut lines = vec![format!(
        "{:>8}  {:<28} {:<16} {:>8}",
        "PID", "NAME", "USER", "MEM(MB)"
    )];
    for process in processes.into_iter().take(limit) {
        let user = process
            .user_id()
            .and_then(|uid| users.get_user_by_id(uid))
            .map(|u| u.name().to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{:>8}  {:<28} {:<16} {:>8}",
            process.pid().as_u32(),
            truncate(&process.name().to_string_lossy(), 28),
            truncate(&user, 16),
            process.memory() / MIB
        ));
    }
    lines.join("\n")
}

fn df() -> String {
    let disks = Disks::new_with_refreshed_list();
    let mut lines = vec![format!(
        "{:<24} {:>9} {:>9} {:>9} {:>5}  {}",
        "Filesystem", "Size", "Used", "Avail", "Use%", "Mounted on"
    )];
    for disk in disks.list() {
        let total = disk.total_space();
        let avail = disk.available_space();
        let used = total.saturating_sub(avail);
        let percent = if total == 0 { 0 } else { used * 100 / total };
        lines.push(format!(
            "{:<24} {:>8.1}G {:>8.1}G {:>8.1}G {:>4}%  {}",
            truncate(&disk.name().to_string_lossy(), 24),
            total as f64 / GIB,
            used as f64 / GIB,
            avail as f64 / GIB,
            percent,
            disk.mount_point().display()
        ));
    }
    lines.join("\n")
}

fn uname() -> String {
    let unknown = || "unknown".to_string();
    format!(
        "{} {} {}",
        System::name().unwrap_or_else(unknown),
        System::kernel_version().unwrap_or_else(unknown),
        std::env::consts::ARCH
    )
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        text.chars().take(width).collect()
    }
}
