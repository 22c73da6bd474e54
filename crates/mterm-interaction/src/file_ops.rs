//! Filesystem builtins: pwd, ls, mkdir, touch, rm, cp, mv, cat, find, grep, edit.

use async_trait::async_trait;
use mterm_core::command::{BuiltinKind, Invocation, builtin_for, split_words};
use mterm_core::error::{MtermError, Result};
use mterm_core::executor::{ExecContext, ExecOutcome, Executor};
use mterm_core::path::absolutize;
use regex::RegexBuilder;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Runs filesystem builtins relative to the session's working directory.
///
/// Everything except `edit` runs on the blocking pool. Long operations check
/// the context's cancellation token between entries, so a timed-out `rm -r`
/// or `cp -r` stops before the router lets go of its lease.
#[derive(Debug, Clone, Default)]
pub struct FileOpsExecutor {
    editor: Option<String>,
}

impl FileOpsExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides `$EDITOR` for `edit`.
    pub fn with_editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = Some(editor.into());
        self
    }

    fn editor_command(&self) -> String {
        self.editor
            .clone()
            .or_else(|| std::env::var("VISUAL").ok().filter(|v| !v.is_empty()))
            .or_else(|| std::env::var("EDITOR").ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| if cfg!(windows) { "notepad" } else { "vi" }.to_string())
    }

    async fn edit(&self, invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
        let args = Args::parse(invocation, "")?;
        let [raw] = args.positional.as_slice() else {
            return Err(usage(invocation.kind));
        };
        let target = absolutize(raw, &context.working_directory);

        let editor = split_words(&self.editor_command());
        let Some((program, editor_args)) = editor.split_first() else {
            return Err(MtermError::config("editor command is empty"));
        };

        tracing::debug!("[FileOps] Launching {} for {}", program, target.display());
        let status = tokio::process::Command::new(program)
            .args(editor_args)
            .arg(&target)
            .current_dir(&context.working_directory)
            .status()
            .await
            .map_err(|e| MtermError::io(format!("failed to start editor '{program}': {e}")))?;

        if status.success() {
            Ok(ExecOutcome::ok(format!("Finished editing '{raw}'")))
        } else {
            let code = status.code().unwrap_or(-1);
            Ok(ExecOutcome::failed(
                format!("Editor exited with status {code}"),
                code,
            ))
        }
    }
}

#[async_trait]
impl Executor for FileOpsExecutor {
    fn name(&self) -> &str {
        "file-ops"
    }

    fn handles(&self, invocation: &Invocation) -> bool {
        use BuiltinKind::*;
        matches!(
            invocation.kind,
            Pwd | Ls | Mkdir | Touch | Rm | Cp | Mv | Cat | Find | Grep | Edit
        )
    }

    async fn execute(&self, invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
        if invocation.kind == BuiltinKind::Edit {
            return self.edit(invocation, context).await;
        }

        let invocation = invocation.clone();
        let context = context.clone();
        tokio::task::spawn_blocking(move || run_blocking(&invocation, &context))
            .await
            .map_err(|e| MtermError::internal(format!("file operation aborted: {e}")))?
    }
}

fn run_blocking(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    context.checkpoint()?;
    match invocation.kind {
        BuiltinKind::Pwd => Ok(ExecOutcome::ok(
            context.working_directory.display().to_string(),
        )),
        BuiltinKind::Ls => ls(invocation, context),
        BuiltinKind::Mkdir => mkdir(invocation, context),
        BuiltinKind::Touch => touch(invocation, context),
        BuiltinKind::Rm => rm(invocation, context),
        BuiltinKind::Cp => cp(invocation, context),
        BuiltinKind::Mv => mv(invocation, context),
        BuiltinKind::Cat => cat(invocation, context),
        BuiltinKind::Find => find(invocation, context),
        BuiltinKind::Grep => grep(invocation, context),
        other => Err(MtermError::internal(format!("{other} is not a file operation"))),
    }
}

/// Flags and positional arguments of one invocation.
struct Args<'a> {
    flags: Vec<char>,
    positional: Vec<&'a str>,
}

impl<'a> Args<'a> {
    /// Expands `-xy` style flags, rejecting flags not in `allowed`.
    fn parse(invocation: &'a Invocation, allowed: &str) -> Result<Self> {
        let split = invocation.split_args();
        let mut flags = Vec::new();
        for word in split.flags {
            for flag in word[1..].chars() {
                if !allowed.contains(flag) {
                    return Err(MtermError::validation(format!(
                        "{}: unknown option -{flag}; usage: {}",
                        invocation.kind,
                        builtin_for(invocation.kind).usage
                    )));
                }
                flags.push(flag);
            }
        }
        Ok(Self {
            flags,
            positional: split.operands,
        })
    }

    fn has(&self, flag: char) -> bool {
        self.flags.contains(&flag)
    }
}

fn usage(kind: BuiltinKind) -> MtermError {
    MtermError::validation(format!("usage: {}", builtin_for(kind).usage))
}

fn missing(raw: &str) -> MtermError {
    MtermError::not_found("path", raw)
}

fn ls(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "al")?;
    let raw = match args.positional.as_slice() {
        [] => ".",
        [one] => *one,
        _ => return Err(usage(invocation.kind)),
    };
    let target = absolutize(raw, cwd);
    let meta = fs::metadata(&target).map_err(|_| missing(raw))?;
    if !meta.is_dir() {
        return Ok(ExecOutcome::ok(raw));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&target)? {
        context.checkpoint()?;
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') && !args.has('a') {
            continue;
        }
        let meta = entry.metadata()?;
        entries.push((name, meta.is_dir(), meta.len()));
    }
    entries.sort();

    let lines: Vec<String> = entries
        .into_iter()
        .map(|(name, is_dir, len)| match (args.has('l'), is_dir) {
            (true, true) => format!("d {:>10}  {}/", "-", name),
            (true, false) => format!("- {:>10}  {}", len, name),
            (false, true) => format!("{name}/"),
            (false, false) => name,
        })
        .collect();
    Ok(ExecOutcome::ok(lines.join("\n")))
}

fn mkdir(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "p")?;
    if args.positional.is_empty() {
        return Err(usage(invocation.kind));
    }
    let mut lines = Vec::new();
    for raw in &args.positional {
        context.checkpoint()?;
        let target = absolutize(raw, cwd);
        match fs::metadata(&target) {
            Ok(meta) if meta.is_dir() => lines.push(format!("Directory '{raw}' already exists")),
            Ok(_) => {
                return Err(MtermError::validation(format!(
                    "{raw}: exists and is not a directory"
                )));
            }
            Err(_) => {
                fs::create_dir_all(&target)?;
                lines.push(format!("Directory '{raw}' created"));
            }
        }
    }
    Ok(ExecOutcome::ok(lines.join("\n")))
}

fn touch(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "")?;
    if args.positional.is_empty() {
        return Err(usage(invocation.kind));
    }
    let mut lines = Vec::new();
    for raw in &args.positional {
        context.checkpoint()?;
        let target = absolutize(raw, cwd);
        if target.exists() {
            let file = OpenOptions::new().append(true).open(&target)?;
            file.set_modified(SystemTime::now())?;
            lines.push(format!("Updated '{raw}'"));
        } else {
            File::create(&target)?;
            lines.push(format!("File '{raw}' created"));
        }
    }
    Ok(ExecOutcome::ok(lines.join("\n")))
}

fn rm(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "rf")?;
    if args.positional.is_empty() {
        return Err(usage(invocation.kind));
    }
    let mut lines = Vec::new();
    for raw in &args.positional {
        context.checkpoint()?;
        let target = absolutize(raw, cwd);
        let meta = match fs::symlink_metadata(&target) {
            Ok(meta) => meta,
            Err(_) if args.has('f') => continue,
            Err(_) => return Err(missing(raw)),
        };
        if meta.is_dir() {
            if !args.has('r') {
                return Err(MtermError::validation(format!(
                    "{raw}: is a directory (use rm -r)"
                )));
            }
            remove_tree(&target, context)?;
            lines.push(format!("Directory '{raw}' removed"));
        } else {
            fs::remove_file(&target)?;
            lines.push(format!("File '{raw}' removed"));
        }
    }
    Ok(ExecOutcome::ok(lines.join("\n")))
}

/// `dst`, or `dst/<name of src>` when `dst` is an existing directory.
fn destination(src: &Path, dst: PathBuf) -> PathBuf {
    match src.file_name() {
        Some(name) if dst.is_dir() => dst.join(name),
        _ => dst,
    }
}

/// Removes a directory tree entry by entry. Symlinks are removed, never
/// followed.
fn remove_tree(dir: &Path, context: &ExecContext) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        context.checkpoint()?;
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            remove_tree(&entry.path(), context)?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    fs::remove_dir(dir)?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path, context: &ExecContext) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        context.checkpoint()?;
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target, context)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn cp(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "r")?;
    let [src_raw, dst_raw] = args.positional.as_slice() else {
        return Err(usage(invocation.kind));
    };
    let src = absolutize(src_raw, cwd);
    let meta = fs::metadata(&src).map_err(|_| missing(src_raw))?;
    let dst = destination(&src, absolutize(dst_raw, cwd));
    if dst == src {
        return Err(MtermError::validation(format!(
            "'{src_raw}' and '{dst_raw}' are the same file"
        )));
    }

    if meta.is_dir() {
        if !args.has('r') {
            return Err(MtermError::validation(format!(
                "{src_raw}: is a directory (use cp -r)"
            )));
        }
        if dst.starts_with(&src) {
            return Err(MtermError::validation(format!(
                "cannot copy '{src_raw}' into itself"
            )));
        }
        copy_dir_recursive(&src, &dst, context)?;
        Ok(ExecOutcome::ok(format!("Directory '{src_raw}' copied to '{dst_raw}'")))
    } else {
        fs::copy(&src, &dst)?;
        Ok(ExecOutcome::ok(format!("File '{src_raw}' copied to '{dst_raw}'")))
    }
}

fn mv(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "")?;
    let [src_raw, dst_raw] = args.positional.as_slice() else {
        return Err(usage(invocation.kind));
    };
    let src = absolutize(src_raw, cwd);
    fs::symlink_metadata(&src).map_err(|_| missing(src_raw))?;
    let dst = destination(&src, absolutize(dst_raw, cwd));
    fs::rename(&src, &dst)?;
    Ok(ExecOutcome::ok(format!("Moved '{src_raw}' to '{dst_raw}'")))
}

fn cat(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "")?;
    if args.positional.is_empty() {
        return Err(usage(invocation.kind));
    }
    let mut output = String::new();
    for raw in &args.positional {
        let target = absolutize(raw, cwd);
        let meta = fs::metadata(&target).map_err(|_| missing(raw))?;
        if meta.is_dir() {
            return Err(MtermError::validation(format!("{raw}: is a directory")));
        }
        output.push_str(&String::from_utf8_lossy(&fs::read(&target)?));
    }
    Ok(ExecOutcome::ok(output))
}

fn find(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "")?;
    let (dir_raw, pattern) = match args.positional.as_slice() {
        [pattern] => (".", *pattern),
        [dir, pattern] => (*dir, *pattern),
        _ => return Err(usage(invocation.kind)),
    };
    let root = absolutize(dir_raw, cwd);
    if !root.is_dir() {
        return Err(missing(dir_raw));
    }

    let needle = pattern.to_lowercase();
    let mut found = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(dir) = pending.pop() {
        context.checkpoint()?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("[FileOps] find skipped {}: {}", dir.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if entry.file_name().to_string_lossy().to_lowercase().contains(&needle) {
                let relative = path.strip_prefix(&root).unwrap_or(&path);
                found.push(Path::new(dir_raw).join(relative).display().to_string());
            }
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                pending.push(path);
            }
        }
    }

    if found.is_empty() {
        return Ok(ExecOutcome::failed(
            format!("No files or directories matching '{pattern}' found"),
            1,
        ));
    }
    found.sort();
    Ok(ExecOutcome::ok(found.join("\n")))
}

fn grep(invocation: &Invocation, context: &ExecContext) -> Result<ExecOutcome> {
    let cwd = &context.working_directory;
    let args = Args::parse(invocation, "i")?;
    let [pattern, files @ ..] = args.positional.as_slice() else {
        return Err(usage(invocation.kind));
    };
    if files.is_empty() {
        return Err(usage(invocation.kind));
    }
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(args.has('i'))
        .build()
        .map_err(|e| MtermError::validation(format!("invalid pattern '{pattern}': {e}")))?;

    let mut matches = Vec::new();
    for raw in files {
        context.checkpoint()?;
        let target = absolutize(raw, cwd);
        let meta = fs::metadata(&target).map_err(|_| missing(raw))?;
        if meta.is_dir() {
            matches.push(format!("grep: {raw}: is a directory"));
            continue;
        }
        let content = String::from_utf8_lossy(&fs::read(&target)?).into_owned();
        for (index, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(format!("{raw}:{}: {}", index + 1, line.trim_end()));
            }
        }
    }

    if matches.is_empty() {
        return Ok(ExecOutcome::failed(format!("Pattern '{pattern}' not found"), 1));
    }
    Ok(ExecOutcome::ok(matches.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mterm_core::session::SessionId;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> ExecContext {
        ExecContext::new(SessionId::from_ordinal(1), dir.path().to_path_buf())
    }

    async fn run(dir: &TempDir, kind: BuiltinKind, args: &[&str]) -> Result<ExecOutcome> {
        let invocation = Invocation::new(kind, args.iter().map(|s| s.to_string()).collect());
        FileOpsExecutor::new()
            .execute(&invocation, &context(dir))
            .await
    }

    #[tokio::test]
    async fn test_mkdir_creates_parents_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let out = run(&dir, BuiltinKind::Mkdir, &["reports/2026"]).await.unwrap();
        assert_eq!(out.output, "Directory 'reports/2026' created");
        assert!(dir.path().join("reports/2026").is_dir());

        let again = run(&dir, BuiltinKind::Mkdir, &["reports"]).await.unwrap();
        assert!(again.output.contains("already exists"));
    }

    #[tokio::test]
    async fn test_touch_then_ls_hides_dotfiles() {
        let dir = TempDir::new().unwrap();
        run(&dir, BuiltinKind::Touch, &["b.txt", ".hidden"]).await.unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let plain = run(&dir, BuiltinKind::Ls, &[]).await.unwrap();
        assert_eq!(plain.output, "a/\nb.txt");
        let all = run(&dir, BuiltinKind::Ls, &["-a"]).await.unwrap();
        assert_eq!(all.output, ".hidden\na/\nb.txt");
    }

    #[tokio::test]
    async fn test_rm_rules() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("tree")).unwrap();
        fs::write(dir.path().join("tree/leaf"), "x").unwrap();

        assert!(run(&dir, BuiltinKind::Rm, &["ghost"]).await.unwrap_err().is_not_found());
        assert!(run(&dir, BuiltinKind::Rm, &["-f", "ghost"]).await.is_ok());
        assert!(run(&dir, BuiltinKind::Rm, &["tree"]).await.unwrap_err().is_validation());

        run(&dir, BuiltinKind::Rm, &["-r", "tree"]).await.unwrap();
        assert!(!dir.path().join("tree").exists());
    }

    #[tokio::test]
    async fn test_cp_and_mv_into_directories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::create_dir(dir.path().join("backup")).unwrap();

        run(&dir, BuiltinKind::Cp, &["notes.txt", "backup"]).await.unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("backup/notes.txt")).unwrap(),
            "hello"
        );

        run(&dir, BuiltinKind::Mv, &["notes.txt", "renamed.txt"]).await.unwrap();
        assert!(!dir.path().join("notes.txt").exists());
        assert!(dir.path().join("renamed.txt").exists());

        assert!(run(&dir, BuiltinKind::Cp, &["backup", "copy"]).await.unwrap_err().is_validation());
        run(&dir, BuiltinKind::Cp, &["-r", "backup", "copy"]).await.unwrap();
        assert!(dir.path().join("copy/notes.txt").exists());
    }

    #[tokio::test]
    async fn test_cat_find_and_grep() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/Main.rs"), "fn main() {}\n// TODO: Hello\n").unwrap();

        let cat = run(&dir, BuiltinKind::Cat, &["src/Main.rs"]).await.unwrap();
        assert!(cat.output.starts_with("fn main()"));

        let find = run(&dir, BuiltinKind::Find, &["main"]).await.unwrap();
        assert_eq!(find.output, "./src/Main.rs");
        let none = run(&dir, BuiltinKind::Find, &["src", "nothing"]).await.unwrap();
        assert_eq!(none.exit_status, 1);

        let grep = run(&dir, BuiltinKind::Grep, &["-i", "hello", "src/Main.rs"]).await.unwrap();
        assert_eq!(grep.output, "src/Main.rs:2: // TODO: Hello");
        let miss = run(&dir, BuiltinKind::Grep, &["hello", "src/Main.rs"]).await.unwrap();
        assert!(!miss.is_success());
    }

    #[tokio::test]
    async fn test_unknown_flags_and_missing_operands_are_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(run(&dir, BuiltinKind::Mkdir, &[]).await.unwrap_err().is_validation());
        assert!(run(&dir, BuiltinKind::Ls, &["-z"]).await.unwrap_err().is_validation());
        assert!(run(&dir, BuiltinKind::Mv, &["only-one"]).await.unwrap_err().is_validation());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_edit_runs_configured_editor() {
        let dir = TempDir::new().unwrap();
        let invocation = Invocation::new(BuiltinKind::Edit, vec!["draft.txt".to_string()]);

        let ok = FileOpsExecutor::new()
            .with_editor("true")
            .execute(&invocation, &context(&dir))
            .await
            .unwrap();
        assert!(ok.is_success());

        let failed = FileOpsExecutor::new()
            .with_editor("false")
            .execute(&invocation, &context(&dir))
            .await
            .unwrap();
        assert_eq!(failed.exit_status, 1);
    }

    #[tokio::test]
    async fn test_operands_after_double_dash_may_start_with_a_dash() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("-x"), "x").unwrap();

        assert!(run(&dir, BuiltinKind::Rm, &["-x"]).await.unwrap_err().is_validation());
        let out = run(&dir, BuiltinKind::Rm, &["--", "-x"]).await.unwrap();
        assert_eq!(out.output, "File '-x' removed");
        assert!(!dir.path().join("-x").exists());
    }

    #[tokio::test]
    async fn test_cancelled_rm_leaves_the_tree_alone() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("big/nested")).unwrap();
        for i in 0..50 {
            fs::write(dir.path().join(format!("big/nested/f{i}")), "x").unwrap();
        }
        let context = context(&dir);
        context.cancel.cancel();

        let invocation = Invocation::new(BuiltinKind::Rm, vec!["-r".into(), "big".into()]);
        let err = FileOpsExecutor::new()
            .execute(&invocation, &context)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(fs::read_dir(dir.path().join("big/nested")).unwrap().count(), 50);
    }

    #[test]
    fn test_cancellation_stops_a_copy_between_entries() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        for i in 0..10 {
            fs::write(dir.path().join(format!("src/f{i}")), "x").unwrap();
        }
        let context = context(&dir);
        context.cancel.cancel();

        let err = copy_dir_recursive(
            &dir.path().join("src"),
            &dir.path().join("dst"),
            &context,
        )
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(fs::read_dir(dir.path().join("dst")).unwrap().count(), 0);
    }
}
