//! Lexical path helpers shared by the scanner and the store.
//!
//! Everything here works on path *text*: nothing resolves symlinks or touches
//! the filesystem except [`absolutize`], which only consults the current
//! working directory. Keeping these lexical matters for the store, where the
//! relative symlink targets must describe the tree as the caller named it, not
//! as the kernel resolves it.
//!
//! # Example
//!
//! ```
//! use dedupstore::scanner::path_utils::{is_descendant, relative_path};
//! use std::path::Path;
//!
//! assert!(is_descendant(Path::new("/data/sub"), Path::new("/data")));
//! assert_eq!(
//!     relative_path(Path::new("/data/a.v0001.txt"), Path::new("/dest/x")),
//!     Path::new("../../data/a.v0001.txt")
//! );
//! ```

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Whether a file or directory name is hidden (dot-prefixed).
#[must_use]
pub fn is_hidden_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// The root of the filesystem that contains the current working directory.
///
/// On Unix this is always `/`. On Windows it is the drive root of the
/// current directory (falling back to `\` if that cannot be determined).
#[must_use]
pub fn filesystem_root() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(cwd) = std::env::current_dir() {
            if let Some(Component::Prefix(prefix)) = cwd.components().next() {
                let mut root = PathBuf::from(prefix.as_os_str());
                root.push(std::path::MAIN_SEPARATOR_STR);
                return root;
            }
        }
        PathBuf::from(std::path::MAIN_SEPARATOR_STR)
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/")
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
///
/// A `..` that would climb above the root is dropped, matching how the
/// kernel treats `/..`.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => true,
                    _ => false,
                };
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Make a path absolute (against the current directory) and normalize it.
///
/// # Errors
///
/// Fails only if the current directory cannot be read.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize_lexically(&absolute))
}

/// Whether `path` equals `ancestor` or lies beneath it.
///
/// Compares whole components, so `/data2` is not a descendant of `/data`.
/// Both paths should already be absolute and normalized.
#[must_use]
pub fn is_descendant(path: &Path, ancestor: &Path) -> bool {
    normalize_lexically(path).starts_with(normalize_lexically(ancestor))
}

/// Express `target` relative to the directory `base`.
///
/// Both inputs should be absolute. If they share no common root (different
/// Windows drives), `target` is returned unchanged.
#[must_use]
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target = normalize_lexically(target);
    let base = normalize_lexically(base);

    let target_parts: Vec<Component<'_>> = target.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();

    let common = target_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 {
        return target;
    }

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}
