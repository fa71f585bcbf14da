//! Filtered directory walker producing [`FileRecord`]s incrementally.
//!
//! # Overview
//!
//! [`Scanner`] compiles a [`ScanOptions`] once and hands out [`Records`]
//! iterators. A `Records` iterator owns everything it needs, so the caller can
//! pull it one record at a time, interleave the pulls with other work, or drop
//! it half way through. Walking is single-threaded and sorted by file name, so
//! two scans of an unchanged tree yield records in the same order.
//!
//! # Filtering
//!
//! - Symlinks are never followed and never yielded
//! - Hidden files / hidden directories (dot-prefixed) can be skipped
//! - Directory patterns prune whole subtrees; file patterns filter names
//! - Zero-length files can be skipped
//!
//! # Example
//!
//! ```no_run
//! use dedupstore::scanner::{ScanOptions, Scanner};
//! use std::path::PathBuf;
//!
//! let scanner = Scanner::new(ScanOptions::default()).unwrap();
//! let files: Vec<_> = scanner
//!     .scan_directories(vec![PathBuf::from("/home/user/Downloads")])
//!     .filter_map(Result::ok)
//!     .collect();
//! println!("Found {} files", files.len());
//! ```

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use super::path_utils;
use super::{FileRecord, ScanError, ScanOptions};

/// Compiled name filters.
#[derive(Debug, Clone)]
struct Filters {
    skip_sub_dir: bool,
    skip_hidden_files: bool,
    skip_hidden_dirs: bool,
    skip_zero_len: bool,
    include_dirs: Vec<Regex>,
    exclude_dirs: Vec<Regex>,
    include_files: Vec<Regex>,
    exclude_files: Vec<Regex>,
}

impl Filters {
    fn compile(options: &ScanOptions) -> Result<Self, ScanError> {
        Ok(Self {
            skip_sub_dir: options.skip_sub_dir,
            skip_hidden_files: options.skip_hidden_files,
            skip_hidden_dirs: options.skip_hidden_dirs,
            skip_zero_len: options.skip_zero_len,
            include_dirs: compile_patterns(&options.include_dir_patterns)?,
            exclude_dirs: compile_patterns(&options.exclude_dir_patterns)?,
            include_files: compile_patterns(&options.include_file_patterns)?,
            exclude_files: compile_patterns(&options.exclude_file_patterns)?,
        })
    }

    fn accepts_dir(&self, name: &OsStr) -> bool {
        if self.skip_hidden_dirs && path_utils::is_hidden_name(name) {
            return false;
        }
        passes_patterns(&name.to_string_lossy(), &self.include_dirs, &self.exclude_dirs)
    }

    fn accepts_file(&self, name: &OsStr) -> bool {
        if self.skip_hidden_files && path_utils::is_hidden_name(name) {
            return false;
        }
        passes_patterns(
            &name.to_string_lossy(),
            &self.include_files,
            &self.exclude_files,
        )
    }

    fn accepts_size(&self, size: u64) -> bool {
        !(self.skip_zero_len && size == 0)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ScanError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ScanError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

fn passes_patterns(name: &str, include: &[Regex], exclude: &[Regex]) -> bool {
    if !include.is_empty() && !include.iter().any(|re| re.is_match(name)) {
        return false;
    }
    !exclude.iter().any(|re| re.is_match(name))
}

/// One unit of work queued on a [`Records`] iterator.
#[derive(Debug)]
enum Source {
    /// Walk a directory; relative paths are computed against it.
    Directory(PathBuf),
    /// Capture a single file; relative path is computed against `root`.
    File { path: PathBuf, root: PathBuf },
}

/// Scanner that turns roots plus filter options into [`FileRecord`]s.
#[derive(Debug, Clone)]
pub struct Scanner {
    filters: Filters,
}

impl Scanner {
    /// Create a scanner, compiling every filter pattern up front.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidPattern`] if any pattern is not a valid
    /// regular expression.
    pub fn new(options: ScanOptions) -> Result<Self, ScanError> {
        Ok(Self {
            filters: Filters::compile(&options)?,
        })
    }

    /// Walk each directory in `roots`, in order.
    #[must_use]
    pub fn scan_directories(&self, roots: Vec<PathBuf>) -> Records {
        self.records(roots.into_iter().map(Source::Directory).collect())
    }

    /// Capture records for explicit files, relative to `root`.
    ///
    /// File-name filters, the hidden-file filter and the zero-length filter
    /// still apply; directory filters do not.
    #[must_use]
    pub fn scan_files(&self, files: Vec<PathBuf>, root: &Path) -> Records {
        self.records(
            files
                .into_iter()
                .map(|path| Source::File {
                    path,
                    root: root.to_path_buf(),
                })
                .collect(),
        )
    }

    /// Scan a mix of directories and files.
    ///
    /// Directories are walked with their own path as the relative root;
    /// anything else is captured as a single file relative to `file_root`.
    #[must_use]
    pub fn scan_paths(&self, items: Vec<PathBuf>, file_root: &Path) -> Records {
        self.records(
            items
                .into_iter()
                .map(|path| {
                    let is_dir = std::fs::symlink_metadata(&path)
                        .map(|m| m.is_dir())
                        .unwrap_or(false);
                    if is_dir {
                        Source::Directory(path)
                    } else {
                        Source::File {
                            path,
                            root: file_root.to_path_buf(),
                        }
                    }
                })
                .collect(),
        )
    }

    fn records(&self, pending: VecDeque<Source>) -> Records {
        Records {
            filters: self.filters.clone(),
            pending,
            current: None,
        }
    }
}

/// Incremental record stream over queued directories and files.
///
/// Errors are yielded as [`ScanError`] values rather than stopping iteration.
pub struct Records {
    filters: Filters,
    pending: VecDeque<Source>,
    current: Option<(PathBuf, walkdir::IntoIter)>,
}

impl std::fmt::Debug for Records {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("pending", &self.pending)
            .field("current", &self.current.as_ref().map(|(root, _)| root))
            .finish()
    }
}

impl Records {
    fn open_directory(&mut self, root: PathBuf) -> Option<Result<FileRecord, ScanError>> {
        let root = match path_utils::absolutize(&root) {
            Ok(root) => root,
            Err(e) => return Some(Err(ScanError::from_io(&root, e))),
        };
        match std::fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Some(Err(ScanError::NotADirectory(root))),
            Err(e) => return Some(Err(ScanError::from_io(&root, e))),
        }

        log::debug!("Scanning directory {}", root.display());
        let mut walk = WalkDir::new(&root).follow_links(false).sort_by_file_name();
        if self.filters.skip_sub_dir {
            walk = walk.max_depth(1);
        }
        self.current = Some((root, walk.into_iter()));
        None
    }

    fn capture_file(&self, path: &Path, root: &Path) -> Option<Result<FileRecord, ScanError>> {
        let name = path.file_name().unwrap_or_default();
        if !self.filters.accepts_file(name) {
            log::trace!("Skipping file due to name filter: {}", path.display());
            return None;
        }
        let record = match FileRecord::from_path(path, root) {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        if record.is_link || record.is_dir {
            log::trace!("Skipping non-regular file: {}", path.display());
            return None;
        }
        if !self.filters.accepts_size(record.size) {
            log::debug!("Skipping empty file: {}", path.display());
            return None;
        }
        Some(Ok(record))
    }
}

impl Iterator for Records {
    type Item = Result<FileRecord, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((root, walk)) = &mut self.current {
                let entry = match walk.next() {
                    None => {
                        self.current = None;
                        continue;
                    }
                    Some(Err(e)) => {
                        let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                        return Some(Err(ScanError::from_io(&path, e.into())));
                    }
                    Some(Ok(entry)) => entry,
                };

                if entry.depth() == 0 {
                    continue;
                }

                let file_type = entry.file_type();
                if file_type.is_symlink() {
                    log::trace!("Skipping symlink: {}", entry.path().display());
                    continue;
                }
                if file_type.is_dir() {
                    if !self.filters.accepts_dir(entry.file_name()) {
                        log::trace!("Pruning directory: {}", entry.path().display());
                        walk.skip_current_dir();
                    }
                    continue;
                }
                if !self.filters.accepts_file(entry.file_name()) {
                    log::trace!("Skipping file due to name filter: {}", entry.path().display());
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => return Some(Err(ScanError::from_io(entry.path(), e.into()))),
                };
                if !metadata.is_file() {
                    continue;
                }
                if !self.filters.accepts_size(metadata.len()) {
                    log::debug!("Skipping empty file: {}", entry.path().display());
                    continue;
                }

                let path = path_utils::normalize_lexically(entry.path());
                return Some(Ok(FileRecord::from_metadata(path, root, &metadata)));
            }

            match self.pending.pop_front()? {
                Source::Directory(root) => {
                    if let Some(err) = self.open_directory(root) {
                        return Some(err);
                    }
                }
                Source::File { path, root } => {
                    if let Some(result) = self.capture_file(&path, &root) {
                        return Some(result);
                    }
                }
            }
        }
    }
}
