//! Path resolution for resource locks and `cd`.

use crate::error::{MtermError, Result};
use std::path::{Component, Path, PathBuf};

/// Expands a leading `~` and joins relative paths onto `base`.
pub fn absolutize(raw: &str, base: &Path) -> PathBuf {
    let expanded = expand_home(raw);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

fn expand_home(raw: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (raw, home) {
        ("~", Some(home)) => home,
        (s, Some(home)) if s.starts_with("~/") => home.join(&s[2..]),
        _ => PathBuf::from(raw),
    }
}

/// Canonical form of an absolute path that may not exist yet.
///
/// The deepest existing ancestor is resolved through the filesystem
/// (symlinks included); the rest is normalized lexically. `..` after a
/// symlink applies to the symlink's target, as the kernel would.
pub fn canonicalize_resource(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(MtermError::validation(format!(
            "{}: expected an absolute path",
            path.display()
        )));
    }

    let mut resolved = PathBuf::new();
    let mut exists = true;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if exists {
                    match std::fs::canonicalize(&resolved) {
                        Ok(real) => resolved = real,
                        Err(_) => exists = false,
                    }
                }
            }
        }
    }
    Ok(resolved)
}
