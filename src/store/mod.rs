//! Deduplicating copy store with a symlinked logical view.
//!
//! # Overview
//!
//! Files are copied into a flat *data root* at most once per distinct content
//! and base name, under version-suffixed names (`report.v0001.pdf`). The
//! caller's intended layout lives in a separate *destination root* made only
//! of symlinks pointing into the data root, with targets relative to each
//! link's directory so the destination tree survives being moved together
//! with the data root.
//!
//! For each [`CopyDescriptor`] the store asks a [`ComparisonSession`] whether
//! the source's bytes already exist in the data root (size plus full content,
//! never names or locations):
//!
//! - **Duplicate**: link to the existing file, copy nothing
//! - **Unique**: copy under the next free version, register the new file so
//!   later descriptors in the batch can reuse it, then link
//! - **Link in place**: skip the data root and link straight to the source
//!
//! The data root is scanned once per batch; nothing else is persisted.
//!
//! # Example
//!
//! ```no_run
//! use dedupstore::store::{copy_batch, files_to_descriptors, StoreConfig};
//! use std::path::{Path, PathBuf};
//!
//! let descriptors = files_to_descriptors(
//!     &[PathBuf::from("/incoming/x.txt"), PathBuf::from("/incoming/y.txt")],
//!     Path::new("docs"),
//!     false,
//! );
//! let report = copy_batch(
//!     &descriptors,
//!     Path::new("/library/view"),
//!     Path::new("/library/data"),
//!     &StoreConfig::default(),
//! )
//! .unwrap();
//! println!("{} copied, {} reused", report.copied(), report.reused());
//! ```

pub mod link;
pub mod version;

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use walkdir::WalkDir;

use crate::checksum::{Checksum, ChecksumError};
use crate::progress::{self, ProgressCallback};
use crate::scanner::{path_utils, ScanError, ScanOptions};
use crate::session::{CompareOptions, ComparisonError, ComparisonSession, SessionConfig, Verdict};

/// One intended logical copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyDescriptor {
    /// File to copy
    pub source: PathBuf,
    /// Where the link goes, relative to the destination root.
    ///
    /// A leading root is ignored and `..` is rejected, so the link always
    /// lands inside the destination root.
    pub destination: PathBuf,
    /// Link straight to `source` instead of storing it
    pub link_in_place: bool,
}

impl CopyDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        link_in_place: bool,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            link_in_place,
        }
    }
}

/// Descriptors placing each file at `relative_dir/<file name>`.
#[must_use]
pub fn files_to_descriptors(
    files: &[PathBuf],
    relative_dir: &Path,
    link_in_place: bool,
) -> Vec<CopyDescriptor> {
    files
        .iter()
        .map(|file| {
            let name = file.file_name().unwrap_or(file.as_os_str());
            CopyDescriptor::new(file.clone(), relative_dir.join(name), link_in_place)
        })
        .collect()
}

/// Descriptors mirroring every regular file below `dir` at its path
/// relative to `dir`.
///
/// Symlinks are not followed. Order is sorted by path.
///
/// # Errors
///
/// Returns [`StoreError::Scan`] if `dir` is missing or a subdirectory cannot
/// be read.
pub fn dir_to_descriptors(dir: &Path, link_in_place: bool) -> Result<Vec<CopyDescriptor>, StoreError> {
    let root = path_utils::absolutize(dir).map_err(|e| StoreError::io(dir, e))?;
    let mut descriptors = Vec::new();
    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&root).to_path_buf();
            ScanError::from_io(&path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&root)
            .unwrap_or(entry.path())
            .to_path_buf();
        descriptors.push(CopyDescriptor::new(entry.path(), relative, link_in_place));
    }
    Ok(descriptors)
}

/// Settings for a batch copy.
#[derive(Clone)]
pub struct StoreConfig {
    /// Text between the base name's dot and the version number
    pub version_prefix: String,
    /// Zero-padded width of the version number
    pub version_digits: usize,
    /// Re-hash both files after each copy
    pub verify: bool,
    /// Progress reporting interval for the data-root scan
    pub report_frequency: usize,
    /// Stop between descriptors once set
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Progress receiver
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("version_prefix", &self.version_prefix)
            .field("version_digits", &self.version_digits)
            .field("verify", &self.verify)
            .field("report_frequency", &self.report_frequency)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            version_prefix: "v".to_string(),
            version_digits: 4,
            verify: false,
            report_frequency: 10,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl StoreConfig {
    /// Set the version prefix.
    #[must_use]
    pub fn with_version_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_prefix = prefix.into();
        self
    }

    /// Set the version width.
    #[must_use]
    pub fn with_version_digits(mut self, digits: usize) -> Self {
        self.version_digits = digits;
        self
    }

    /// Enable post-copy verification.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set the scan reporting interval.
    #[must_use]
    pub fn with_report_frequency(mut self, frequency: usize) -> Self {
        self.report_frequency = frequency.max(1);
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Errors from the copy store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A link destination is the data root or lies inside it.
    #[error("Destination {dest} is inside data root {data}")]
    DestinationInsideData {
        /// Destination root
        dest: PathBuf,
        /// Data root
        data: PathBuf,
    },

    /// A descriptor destination is empty or climbs out with `..`.
    #[error("Destination must name a path inside the destination root: {0}")]
    InvalidDestination(PathBuf),

    /// A source file does not exist.
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    /// A source exists but is not a regular file.
    #[error("Source is not a regular file: {0}")]
    SourceNotFile(PathBuf),

    /// A real directory occupies a link destination.
    #[error("Destination is a directory: {0}")]
    DestinationIsDirectory(PathBuf),

    /// A copy's digest differs from its source.
    #[error("Verification failed: {copy} ({actual}) does not match {source_path} ({expected})")]
    Verification {
        /// File that was copied
        source_path: PathBuf,
        /// The copy that was written (and removed)
        copy: PathBuf,
        /// Source digest
        expected: Checksum,
        /// Copy digest
        actual: Checksum,
    },

    /// A file could not be hashed.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// A source could not be compared against the store.
    #[error(transparent)]
    Comparison(#[from] ComparisonError),

    /// A filesystem operation failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Scanning the data root or a source failed.
    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl StoreError {
    /// Whether the batch was rejected before touching the filesystem.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DestinationInsideData { .. }
                | Self::InvalidDestination(_)
                | Self::SourceNotFound(_)
                | Self::SourceNotFile(_)
        )
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A batch that stopped on an error, with the descriptors completed before it.
///
/// Links placed for `report.entries` stay on disk.
#[derive(thiserror::Error, Debug)]
#[error("Copy batch stopped after {} completed descriptor(s)", .report.entries.len())]
pub struct BatchError {
    /// What was done before the failure
    pub report: CopyReport,
    /// The failure
    #[source]
    pub error: StoreError,
}

impl BatchError {
    /// Whether the batch was rejected before touching the filesystem.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.error.is_validation()
    }
}

impl From<StoreError> for BatchError {
    fn from(error: StoreError) -> Self {
        Self {
            report: CopyReport::default(),
            error,
        }
    }
}

/// How one descriptor was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyOutcome {
    /// New bytes were written to the data root.
    Copied,
    /// Existing bytes in the data root were reused.
    Reused,
    /// The link points at the source itself.
    LinkedInPlace,
}

/// Result for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyEntry {
    /// Absolute source path
    pub source: PathBuf,
    /// Absolute link path
    pub destination: PathBuf,
    /// Physical file the link resolves to
    pub stored: PathBuf,
    /// How it was satisfied
    pub outcome: CopyOutcome,
}

/// Result of a batch copy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyReport {
    /// Source path → physical file representing its content
    pub resolved: BTreeMap<PathBuf, PathBuf>,
    /// Per-descriptor results, in batch order
    pub entries: Vec<CopyEntry>,
    /// Whether a shutdown request cut the batch short
    pub interrupted: bool,
}

impl CopyReport {
    fn count(&self, outcome: CopyOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    /// Descriptors that wrote new bytes.
    #[must_use]
    pub fn copied(&self) -> usize {
        self.count(CopyOutcome::Copied)
    }

    /// Descriptors that reused stored bytes.
    #[must_use]
    pub fn reused(&self) -> usize {
        self.count(CopyOutcome::Reused)
    }

    /// Descriptors linked straight to their source.
    #[must_use]
    pub fn linked_in_place(&self) -> usize {
        self.count(CopyOutcome::LinkedInPlace)
    }
}

/// A data root plus the session that knows what it holds.
#[derive(Debug)]
pub struct DedupStore {
    data_root: PathBuf,
    config: StoreConfig,
    session: ComparisonSession,
}

impl DedupStore {
    /// Open (creating if needed) `data_root` and index its contents.
    ///
    /// # Errors
    ///
    /// Fails if the data root cannot be created or scanned.
    pub fn open(data_root: &Path, config: StoreConfig) -> Result<Self, StoreError> {
        let data_root = path_utils::absolutize(data_root).map_err(|e| StoreError::io(data_root, e))?;
        std::fs::create_dir_all(&data_root).map_err(|e| StoreError::io(&data_root, e))?;

        // Every stored file counts, however it is named or sized.
        let scan = ScanOptions::default()
            .with_skip_zero_len(false)
            .with_report_frequency(config.report_frequency);
        let mut session = ComparisonSession::new(SessionConfig::default().with_scan_options(scan))?;

        let run = session.scan_canonical(vec![data_root.clone()]);
        let outcome = progress::drive(
            run,
            progress::PHASE_SCAN_CANONICAL,
            0,
            config.progress_callback.as_deref(),
            config.shutdown_flag.as_deref(),
        );
        if let Some(err) = session.take_scan_errors().into_iter().next() {
            return Err(err.into());
        }
        log::info!(
            "Data root {} holds {} file(s)",
            data_root.display(),
            outcome.processed
        );

        Ok(Self {
            data_root,
            config,
            session,
        })
    }

    /// The absolute data root.
    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// The session tracking the data root.
    #[must_use]
    pub fn session(&self) -> &ComparisonSession {
        &self.session
    }

    /// Store `source` (unless its content is already stored) and link
    /// `destination` to the stored file.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be compared or copied, verification fails,
    /// or the link cannot be placed.
    pub fn store_file(&mut self, source: &Path, destination: &Path) -> Result<CopyEntry, StoreError> {
        let source = path_utils::absolutize(source).map_err(|e| StoreError::io(source, e))?;
        let destination =
            path_utils::absolutize(destination).map_err(|e| StoreError::io(destination, e))?;
        self.check_outside_data(&destination)?;

        self.session.clear_query();
        self.session.append_to_query(&source)?;
        self.session.compare(CompareOptions::default()).finish();

        if self.session.classification().source_error_files.contains(&source) {
            let mut classification = self.session.take_classification();
            return Err(match classification.errors.pop() {
                Some(err) => err.into(),
                None => StoreError::SourceNotFound(source),
            });
        }

        let (stored, outcome) = match self.session.classification().verdict(&source) {
            Some(Verdict::Duplicate) => {
                let existing = self
                    .session
                    .classification()
                    .first_match(&source)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source.clone());
                log::debug!("Reusing {} for {}", existing.display(), source.display());
                (existing, CopyOutcome::Reused)
            }
            Some(Verdict::ImplicitlyPresent) => {
                log::debug!("Already stored: {}", source.display());
                (source.clone(), CopyOutcome::Reused)
            }
            Some(Verdict::Unique) | None => (self.copy_new_version(&source, &destination)?, CopyOutcome::Copied),
        };

        link::link_relative(&stored, &destination)?;
        Ok(CopyEntry {
            source,
            destination,
            stored,
            outcome,
        })
    }

    fn check_outside_data(&self, destination: &Path) -> Result<(), StoreError> {
        if path_utils::is_descendant(destination, &self.data_root) {
            return Err(StoreError::DestinationInsideData {
                dest: destination.to_path_buf(),
                data: self.data_root.clone(),
            });
        }
        Ok(())
    }

    fn copy_new_version(&mut self, source: &Path, destination: &Path) -> Result<PathBuf, StoreError> {
        let name = destination
            .file_name()
            .ok_or_else(|| StoreError::DestinationIsDirectory(destination.to_path_buf()))?;
        let (written, digest) = version::copy_with_version(
            source,
            &self.data_root.join(name),
            &self.config.version_prefix,
            self.config.version_digits,
            self.config.verify,
        )?;
        self.session.append_to_canonical(&written)?;
        if let Some(digest) = digest {
            self.session.cache_mut().insert(written.clone(), digest);
        }
        log::info!("Stored {} as {}", source.display(), written.display());
        Ok(written)
    }

    /// Link `destination` straight to `source`, bypassing the data root.
    ///
    /// # Errors
    ///
    /// Fails if the link cannot be placed.
    pub fn link_in_place(&self, source: &Path, destination: &Path) -> Result<CopyEntry, StoreError> {
        let source = path_utils::absolutize(source).map_err(|e| StoreError::io(source, e))?;
        let destination =
            path_utils::absolutize(destination).map_err(|e| StoreError::io(destination, e))?;
        self.check_outside_data(&destination)?;
        link::place_symlink(&source, &destination)?;
        Ok(CopyEntry {
            stored: source.clone(),
            source,
            destination,
            outcome: CopyOutcome::LinkedInPlace,
        })
    }
}

/// Place `destination` below `dest_root`.
///
/// Root and drive prefixes are dropped, so `/x/a.txt` means `dest_root/x/a.txt`.
fn resolve_destination(dest_root: &Path, destination: &Path) -> Result<PathBuf, StoreError> {
    let mut resolved = dest_root.to_path_buf();
    let mut named = false;
    for component in destination.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                named = true;
            }
            Component::ParentDir => {
                return Err(StoreError::InvalidDestination(destination.to_path_buf()))
            }
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
        }
    }
    if !named {
        return Err(StoreError::InvalidDestination(destination.to_path_buf()));
    }
    Ok(resolved)
}

/// Check everything that can be checked before any filesystem change, and
/// return each descriptor's absolute link path.
fn validate_batch(
    descriptors: &[CopyDescriptor],
    dest_root: &Path,
    data_root: &Path,
) -> Result<Vec<PathBuf>, StoreError> {
    if path_utils::is_descendant(dest_root, data_root) {
        return Err(StoreError::DestinationInsideData {
            dest: dest_root.to_path_buf(),
            data: data_root.to_path_buf(),
        });
    }
    let mut destinations = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        // The data root may itself live inside the destination root.
        let destination = resolve_destination(dest_root, &descriptor.destination)?;
        if path_utils::is_descendant(&destination, data_root) {
            return Err(StoreError::DestinationInsideData {
                dest: destination,
                data: data_root.to_path_buf(),
            });
        }
        destinations.push(destination);

        let source = &descriptor.source;
        match std::fs::symlink_metadata(source) {
            Ok(meta) if meta.file_type().is_file() => {}
            Ok(_) => return Err(StoreError::SourceNotFile(source.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SourceNotFound(source.clone()))
            }
            Err(e) => return Err(StoreError::io(source, e)),
        }
    }
    Ok(destinations)
}

/// Copy a batch of descriptors into `data_root`, linking each under
/// `dest_root`.
///
/// The whole batch is validated first; a validation failure changes nothing
/// on disk. After that, descriptors are processed in order and a failure
/// stops the batch without undoing descriptors that already completed. The
/// error carries the report of those completed descriptors.
///
/// # Errors
///
/// Returns a validation error ([`BatchError::is_validation`]) if `dest_root`
/// or any link destination is inside `data_root`, a destination climbs out
/// of `dest_root`, or a source is missing or not a regular file, and
/// otherwise the first error met while processing.
pub fn copy_batch(
    descriptors: &[CopyDescriptor],
    dest_root: &Path,
    data_root: &Path,
    config: &StoreConfig,
) -> Result<CopyReport, BatchError> {
    let dest_root = path_utils::absolutize(dest_root).map_err(|e| StoreError::io(dest_root, e))?;
    let data_root = path_utils::absolutize(data_root).map_err(|e| StoreError::io(data_root, e))?;
    let destinations = validate_batch(descriptors, &dest_root, &data_root)?;

    let mut store = DedupStore::open(&data_root, config.clone())?;
    let mut report = CopyReport::default();
    let callback = config.progress_callback.as_deref();

    if let Some(cb) = callback {
        cb.on_phase_start(progress::PHASE_COPY, descriptors.len());
    }
    for (i, (descriptor, destination)) in descriptors.iter().zip(&destinations).enumerate() {
        if config.is_shutdown_requested() {
            log::info!("Shutdown requested, {} descriptor(s) left", descriptors.len() - i);
            report.interrupted = true;
            break;
        }

        let placed = if descriptor.link_in_place {
            store.link_in_place(&descriptor.source, destination)
        } else {
            store.store_file(&descriptor.source, destination)
        };
        let entry = match placed {
            Ok(entry) => entry,
            Err(error) => {
                if let Some(cb) = callback {
                    cb.on_phase_end(progress::PHASE_COPY);
                }
                return Err(BatchError { report, error });
            }
        };
        report
            .resolved
            .insert(entry.source.clone(), entry.stored.clone());
        report.entries.push(entry);

        if let Some(cb) = callback {
            cb.on_progress(i + 1, &descriptor.source.to_string_lossy());
        }
    }
    if let Some(cb) = callback {
        cb.on_phase_end(progress::PHASE_COPY);
    }

    log::info!(
        "Batch done: {} copied, {} reused, {} linked in place",
        report.copied(),
        report.reused(),
        report.linked_in_place()
    );
    Ok(report)
}
