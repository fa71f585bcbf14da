//! Version-suffixed file names and never-overwriting copies.
//!
//! Every physical file in the store is named
//! `{base}.{prefix}{version}{ext}`, with the version zero-padded to a fixed
//! width. The next version for a base name is the smallest positive integer
//! whose name is not taken yet; nothing outside the directory itself records
//! which versions exist.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::checksum::{Checksum, Hasher};

use super::StoreError;

/// Split a file name into base and extension (with its dot).
///
/// Only the last extension counts: `archive.tar.gz` → (`archive.tar`, `.gz`).
/// A leading dot does not start an extension: `.bashrc` → (`.bashrc`, ``).
#[must_use]
pub fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

/// Build the stored name for `file_name` at `version`.
///
/// # Example
///
/// ```
/// use dedupstore::store::version::versioned_name;
///
/// assert_eq!(versioned_name("report.pdf", "v", 3, 4), "report.v0003.pdf");
/// ```
#[must_use]
pub fn versioned_name(file_name: &str, prefix: &str, version: u32, digits: usize) -> String {
    let (base, ext) = split_name(file_name);
    format!("{base}.{prefix}{version:0digits$}{ext}")
}

/// The first unused versioned path for `file_name` inside `dir`.
///
/// Dangling symlinks count as taken.
#[must_use]
pub fn next_version_path(dir: &Path, file_name: &str, prefix: &str, digits: usize) -> PathBuf {
    (1u32..)
        .map(|version| dir.join(versioned_name(file_name, prefix, version, digits)))
        .find(|candidate| fs::symlink_metadata(candidate).is_err())
        .unwrap_or_else(|| dir.join(versioned_name(file_name, prefix, u32::MAX, digits)))
}

/// Copy bytes into a file that must not exist yet, carrying over permissions.
fn copy_new(source: &Path, destination: &Path) -> io::Result<u64> {
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    let permissions = reader.metadata()?.permissions();
    fs::set_permissions(destination, permissions)?;
    Ok(bytes)
}

/// Copy `source` to a new file at `destination` and check the copy's digest.
///
/// A copy whose digest differs from the source is removed before the
/// [`StoreError::Verification`] is returned.
///
/// # Errors
///
/// Fails if `destination` already exists, if either file cannot be read or
/// written, or if verification fails.
pub fn verified_copy(source: &Path, destination: &Path) -> Result<Checksum, StoreError> {
    copy_new(source, destination).map_err(|e| StoreError::io(destination, e))?;
    verify(&Hasher::new(), source, destination)
}

fn verify(hasher: &Hasher, source: &Path, copy: &Path) -> Result<Checksum, StoreError> {
    let expected = hasher.hash_file(source)?;
    let actual = hasher.hash_file(copy)?;
    if expected != actual {
        log::error!(
            "Verification failed for {}: {} != {}",
            copy.display(),
            expected,
            actual
        );
        let _ = fs::remove_file(copy);
        return Err(StoreError::Verification {
            source_path: source.to_path_buf(),
            copy: copy.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(expected)
}

/// Copy `source` next to `destination` under the next free version number.
///
/// `destination` names the directory and the unversioned file name; the
/// file actually written is `{base}.{prefix}{N}{ext}` in that directory.
/// Returns the path written and, when `verify` is set, the verified digest.
///
/// # Errors
///
/// Fails if the directory cannot be created, the copy fails, or
/// verification fails.
pub fn copy_with_version(
    source: &Path,
    destination: &Path,
    prefix: &str,
    digits: usize,
    verify_copy: bool,
) -> Result<(PathBuf, Option<Checksum>), StoreError> {
    let dir = destination.parent().unwrap_or_else(|| Path::new("."));
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StoreError::DestinationIsDirectory(destination.to_path_buf()))?;
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    loop {
        let target = next_version_path(dir, &file_name, prefix, digits);
        match copy_new(source, &target) {
            Ok(bytes) => {
                log::debug!("Copied {} ({} bytes) to {}", source.display(), bytes, target.display());
                let digest = if verify_copy {
                    Some(verify(&Hasher::new(), source, &target)?)
                } else {
                    None
                };
                return Ok((target, digest));
            }
            // Taken between the probe and the create; try the next one.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StoreError::io(&target, e)),
        }
    }
}
