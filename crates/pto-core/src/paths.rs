//! Path resolution for config-relative include/source lists.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Resolve `paths` against `base` into absolute, de-duplicated paths.
///
/// Order of first occurrence is preserved. Existing paths are canonicalized
/// (symlinks resolved); paths that do not exist yet are normalized lexically.
pub fn resolve_all(base: &Path, paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(paths.len());
    for path in paths {
        let abs = resolve(base, path);
        if seen.insert(abs.clone()) {
            resolved.push(abs);
        }
    }
    resolved
}

/// Resolve a single path against `base`.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        absolute_base(base).join(path)
    };
    std::fs::canonicalize(&joined).unwrap_or_else(|_| normalize(&joined))
}

fn absolute_base(base: &Path) -> PathBuf {
    if base.is_absolute() {
        return base.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(base),
        Err(_) => base.to_path_buf(),
    }
}

/// Drop `.` components and fold `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
