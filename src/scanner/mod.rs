//! Scanner module for directory traversal and per-file metadata capture.
//!
//! This module provides functionality for:
//! - Filtered, deterministic directory walking using walkdir
//! - Capturing the attribute set used for candidate lookup ([`FileRecord`])
//! - Lexical path helpers ([`path_utils`])
//!
//! # Architecture
//!
//! - [`walker`]: Directory traversal and file discovery
//! - [`path_utils`]: Hidden-name detection, lexical normalisation, relative paths
//!
//! # Example
//!
//! ```no_run
//! use dedupstore::scanner::{ScanOptions, Scanner};
//! use std::path::PathBuf;
//!
//! let options = ScanOptions {
//!     skip_hidden_files: true,
//!     ..Default::default()
//! };
//!
//! let scanner = Scanner::new(options).unwrap();
//! for record in scanner.scan_directories(vec![PathBuf::from(".")]) {
//!     match record {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod path_utils;
pub mod walker;

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

pub use walker::{Records, Scanner};

/// Metadata for a discovered file.
///
/// Immutable once produced. Every attribute the candidate index is keyed on
/// lives here, alongside ownership and mode bits for callers that want them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// File name, including extension
    pub name: String,
    /// Extension including the leading dot (`".txt"`), empty if none
    pub file_type: String,
    /// Name of the directory that contains the file
    pub parent: String,
    /// Path relative to the root the file was scanned from
    pub rel_path: PathBuf,
    /// Status change time (creation time on platforms without ctime)
    pub ctime: SystemTime,
    /// Last modification time
    pub mtime: SystemTime,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Whether the entry is a symbolic link
    pub is_link: bool,
    /// Raw mode bits (0 where unsupported)
    pub mode: u32,
    /// Owner user id (0 where unsupported)
    pub uid: u32,
    /// Owner group id (0 where unsupported)
    pub gid: u32,
}

impl FileRecord {
    /// Capture the record for `path`, computing `rel_path` against `root`.
    ///
    /// Symlinks are not followed: a link yields a record describing the link
    /// itself with `is_link` set.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] if the file's metadata cannot be read.
    pub fn from_path(path: &Path, root: &Path) -> Result<Self, ScanError> {
        let path = path_utils::absolutize(path).map_err(|e| ScanError::from_io(path, e))?;
        let root = path_utils::absolutize(root).map_err(|e| ScanError::from_io(root, e))?;
        let metadata =
            std::fs::symlink_metadata(&path).map_err(|e| ScanError::from_io(&path, e))?;
        Ok(Self::from_metadata(path, &root, &metadata))
    }

    /// Build a record from already-fetched metadata.
    ///
    /// `path` and `root` must be absolute and normalized.
    #[must_use]
    pub fn from_metadata(path: PathBuf, root: &Path, metadata: &Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_type = Path::new(&name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let parent = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rel_path = path_utils::relative_path(&path, root);
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let (ctime, mode, uid, gid) = platform_fields(metadata, mtime);
        let file_type_info = metadata.file_type();

        Self {
            size: metadata.len(),
            name,
            file_type,
            parent,
            rel_path,
            ctime,
            mtime,
            is_dir: file_type_info.is_dir(),
            is_link: file_type_info.is_symlink(),
            mode,
            uid,
            gid,
            path,
        }
    }
}

#[cfg(unix)]
fn platform_fields(metadata: &Metadata, _mtime: SystemTime) -> (SystemTime, u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;

    let secs = metadata.ctime();
    let nanos = metadata.ctime_nsec().clamp(0, 999_999_999) as u32;
    let ctime = if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        SystemTime::UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::new(0, nanos)
    };
    (ctime, metadata.mode(), metadata.uid(), metadata.gid())
}

#[cfg(not(unix))]
fn platform_fields(metadata: &Metadata, mtime: SystemTime) -> (SystemTime, u32, u32, u32) {
    let ctime = metadata.created().unwrap_or(mtime);
    (ctime, 0, 0, 0)
}

/// Filter configuration for a scan.
///
/// Pattern lists hold regular expressions. Directory patterns are matched
/// against directory names as the walk descends; file patterns against file
/// names. An include list, when non-empty, requires at least one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Only scan the top level of each root.
    pub skip_sub_dir: bool,
    /// Skip files whose names start with `.`.
    pub skip_hidden_files: bool,
    /// Skip directories whose names start with `.` (and everything below them).
    pub skip_hidden_dirs: bool,
    /// Skip zero-length files.
    pub skip_zero_len: bool,
    /// Only descend into directories matching one of these.
    pub include_dir_patterns: Vec<String>,
    /// Never descend into directories matching any of these.
    pub exclude_dir_patterns: Vec<String>,
    /// Only record files matching one of these.
    pub include_file_patterns: Vec<String>,
    /// Never record files matching any of these.
    pub exclude_file_patterns: Vec<String>,
    /// Yield a running count every this many files.
    pub report_frequency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            skip_sub_dir: false,
            skip_hidden_files: false,
            skip_hidden_dirs: false,
            skip_zero_len: true,
            include_dir_patterns: Vec::new(),
            exclude_dir_patterns: Vec::new(),
            include_file_patterns: Vec::new(),
            exclude_file_patterns: Vec::new(),
            report_frequency: 10,
        }
    }
}

impl ScanOptions {
    /// Set the reporting interval (clamped to at least 1).
    #[must_use]
    pub fn with_report_frequency(mut self, frequency: usize) -> Self {
        self.report_frequency = frequency.max(1);
        self
    }

    /// Set whether zero-length files are skipped.
    #[must_use]
    pub fn with_skip_zero_len(mut self, skip: bool) -> Self {
        self.skip_zero_len = skip;
        self
    }

    /// Set whether hidden files and hidden directories are skipped.
    #[must_use]
    pub fn with_skip_hidden(mut self, files: bool, dirs: bool) -> Self {
        self.skip_hidden_files = files;
        self.skip_hidden_dirs = dirs;
        self
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A filter pattern failed to compile.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern text
        pattern: String,
        /// The regex compile error
        #[source]
        source: regex::Error,
    },

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for `path`.
    pub(crate) fn from_io(path: &Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => {
                log::warn!("Permission denied: {}", path.display());
                Self::PermissionDenied(path.to_path_buf())
            }
            ErrorKind::NotFound => {
                log::debug!("File not found (may have been deleted): {}", path.display());
                Self::NotFound(path.to_path_buf())
            }
            _ => {
                log::warn!("I/O error for {}: {}", path.display(), error);
                Self::Io {
                    path: path.to_path_buf(),
                    source: error,
                }
            }
        }
    }
}
