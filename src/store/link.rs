//! Symlink placement for the logical destination tree.
//!
//! A new link is first created under a temporary name in the destination's
//! directory and then renamed over the destination. Rename within one
//! directory replaces the old entry atomically, so the destination never
//! disappears while it is being relinked.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::StoreError;
use crate::scanner::path_utils;

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

fn temp_link_path(link: &Path) -> PathBuf {
    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    link.with_file_name(format!(".{}.{}.dslink", name, std::process::id()))
}

/// Make `link` a symlink whose content is exactly `target`.
///
/// Parent directories are created as needed. An existing file or symlink at
/// `link` is replaced; an existing real directory is an error.
///
/// # Errors
///
/// Returns [`StoreError::DestinationIsDirectory`] if `link` is a directory,
/// or [`StoreError::Io`] if any filesystem step fails.
pub fn place_symlink(target: &Path, link: &Path) -> Result<(), StoreError> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    if let Ok(meta) = fs::symlink_metadata(link) {
        if meta.is_dir() {
            return Err(StoreError::DestinationIsDirectory(link.to_path_buf()));
        }
    }

    let temp = temp_link_path(link);
    if fs::symlink_metadata(&temp).is_ok() {
        fs::remove_file(&temp).map_err(|e| StoreError::io(&temp, e))?;
    }
    make_symlink(target, &temp).map_err(|e| StoreError::io(&temp, e))?;
    if let Err(e) = fs::rename(&temp, link) {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::io(link, e));
    }
    log::debug!("Linked {} -> {}", link.display(), target.display());
    Ok(())
}

/// Link `link` to `stored`, with the target relative to the link's directory.
///
/// Both paths must be absolute.
///
/// # Errors
///
/// See [`place_symlink`].
pub fn link_relative(stored: &Path, link: &Path) -> Result<PathBuf, StoreError> {
    let base = link.parent().unwrap_or_else(|| Path::new("/"));
    let target = path_utils::relative_path(stored, base);
    place_symlink(&target, link)?;
    Ok(target)
}
