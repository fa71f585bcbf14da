//! Comparison session: classify query files against a canonical set.
//!
//! # Overview
//!
//! A [`ComparisonSession`] owns two [`AttributeIndex`]es (canonical and query),
//! a [`ChecksumCache`] and a [`Hasher`]. Populating the indices and running a
//! comparison are both incremental: [`ScanRun`] and [`CompareRun`] are
//! iterators that do a bounded amount of work per step and yield the running
//! count of processed files every `report_frequency` files, then once more
//! when finished. Dropping one early leaves the session valid, just with a
//! partially populated index or a partial classification.
//!
//! For each query file, [`CompareRun`]:
//! 1. Builds a [`CandidateQuery`] from the file's own attributes, following
//!    the [`CompareOptions`] flags (size is always used)
//! 2. Fetches candidates from the canonical index
//! 3. Verifies each candidate by content, reusing cached digests, unless the
//!    options say attribute equality is enough
//! 4. Files the query path under duplicates, unique, or implicitly present
//!
//! # Example
//!
//! ```no_run
//! use dedupstore::session::{ComparisonSession, CompareOptions, SessionConfig};
//! use std::path::PathBuf;
//!
//! let mut session = ComparisonSession::new(SessionConfig::default()).unwrap();
//! session.scan_canonical(vec![PathBuf::from("/store")]).finish();
//! session.scan_query(vec![PathBuf::from("/incoming")]).finish();
//! session.compare(CompareOptions::default()).finish();
//!
//! for (query, matches) in &session.classification().duplicates {
//!     println!("{} duplicates {}", query.display(), matches[0].display());
//! }
//! ```

mod classification;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::cache::ChecksumCache;
use crate::checksum::{Hasher, CHUNK_SIZE};
use crate::index::{AttributeIndex, CandidateQuery};
use crate::scanner::{path_utils, FileRecord, Records, ScanError, ScanOptions, Scanner};

pub use classification::{Classification, CompareStats, ComparisonError, Verdict};

/// Configuration for a [`ComparisonSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Filters and reporting interval used for every scan.
    pub scan: ScanOptions,
    /// Read size for checksum computation.
    pub chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl SessionConfig {
    /// Set the scan options.
    #[must_use]
    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Set the checksum read size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Which attributes must agree before two files are candidates.
///
/// Size always has to agree. With `skip_checksum`, agreeing attributes are
/// taken as proof of identical content; that only makes sense together with
/// at least `use_name`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Require the same file name
    pub use_name: bool,
    /// Require the same extension
    pub use_type: bool,
    /// Require the same parent directory name
    pub use_parent: bool,
    /// Require the same path relative to the scan root
    pub use_rel_path: bool,
    /// Require the same ctime
    pub use_ctime: bool,
    /// Require the same mtime
    pub use_mtime: bool,
    /// Trust attribute equality without reading file contents
    pub skip_checksum: bool,
}

impl CompareOptions {
    /// Require the same file name.
    #[must_use]
    pub fn with_name(mut self, enabled: bool) -> Self {
        self.use_name = enabled;
        self
    }

    /// Require the same extension.
    #[must_use]
    pub fn with_type(mut self, enabled: bool) -> Self {
        self.use_type = enabled;
        self
    }

    /// Require the same parent directory name.
    #[must_use]
    pub fn with_parent(mut self, enabled: bool) -> Self {
        self.use_parent = enabled;
        self
    }

    /// Require the same relative path.
    #[must_use]
    pub fn with_rel_path(mut self, enabled: bool) -> Self {
        self.use_rel_path = enabled;
        self
    }

    /// Require the same ctime.
    #[must_use]
    pub fn with_ctime(mut self, enabled: bool) -> Self {
        self.use_ctime = enabled;
        self
    }

    /// Require the same mtime.
    #[must_use]
    pub fn with_mtime(mut self, enabled: bool) -> Self {
        self.use_mtime = enabled;
        self
    }

    /// Skip content verification.
    #[must_use]
    pub fn with_skip_checksum(mut self, enabled: bool) -> Self {
        self.skip_checksum = enabled;
        self
    }

    /// Build the index query for `record` under these options.
    ///
    /// Empty text attributes (no extension, no parent) are left out rather
    /// than matched literally.
    #[must_use]
    pub fn candidate_query(&self, record: &FileRecord) -> CandidateQuery {
        let mut query = CandidateQuery::by_size(record.size);
        if self.use_name && !record.name.is_empty() {
            query = query.with_name(record.name.clone());
        }
        if self.use_type && !record.file_type.is_empty() {
            query = query.with_file_type(record.file_type.clone());
        }
        if self.use_parent && !record.parent.is_empty() {
            query = query.with_parent(record.parent.clone());
        }
        if self.use_rel_path && !record.rel_path.as_os_str().is_empty() {
            query = query.with_rel_path(record.rel_path.clone());
        }
        if self.use_ctime {
            query = query.with_ctime(record.ctime);
        }
        if self.use_mtime {
            query = query.with_mtime(record.mtime);
        }
        query
    }
}

/// Classifies query files against a canonical set of files.
///
/// Single owner, single flow: not meant to be shared between threads.
#[derive(Debug)]
pub struct ComparisonSession {
    scanner: Scanner,
    report_frequency: usize,
    canonical: AttributeIndex,
    canonical_roots: Vec<PathBuf>,
    query: AttributeIndex,
    cache: ChecksumCache,
    hasher: Hasher,
    classification: Classification,
    scan_errors: Vec<ScanError>,
}

impl ComparisonSession {
    /// Create an empty session.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidPattern`] if a filter pattern does not
    /// compile.
    pub fn new(config: SessionConfig) -> Result<Self, ScanError> {
        let report_frequency = config.scan.report_frequency.max(1);
        Ok(Self {
            scanner: Scanner::new(config.scan)?,
            report_frequency,
            canonical: AttributeIndex::new(),
            canonical_roots: Vec::new(),
            query: AttributeIndex::new(),
            cache: ChecksumCache::new(),
            hasher: Hasher::with_chunk_size(config.chunk_size),
            classification: Classification::default(),
            scan_errors: Vec::new(),
        })
    }

    /// Start scanning directories into the canonical index.
    pub fn scan_canonical(&mut self, roots: Vec<PathBuf>) -> ScanRun<'_> {
        for root in &roots {
            if let Ok(root) = path_utils::absolutize(root) {
                if !self.canonical_roots.contains(&root) {
                    self.canonical_roots.push(root);
                }
            }
        }
        log::info!("Scanning {} canonical root(s)", roots.len());
        let records = self.scanner.scan_directories(roots);
        ScanRun::new(
            records,
            &mut self.canonical,
            &mut self.scan_errors,
            self.report_frequency,
        )
    }

    /// Start scanning query items: directories are walked, files captured.
    pub fn scan_query(&mut self, items: Vec<PathBuf>) -> ScanRun<'_> {
        log::info!("Scanning {} query item(s)", items.len());
        let records = self
            .scanner
            .scan_paths(items, &path_utils::filesystem_root());
        ScanRun::new(
            records,
            &mut self.query,
            &mut self.scan_errors,
            self.report_frequency,
        )
    }

    /// Add one file to the canonical index without rescanning.
    ///
    /// The relative path is computed against the canonical root that holds
    /// the file, or the filesystem root if none does.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] if the file's metadata cannot be read.
    pub fn append_to_canonical(&mut self, path: &Path) -> Result<(), ScanError> {
        let absolute = path_utils::absolutize(path).map_err(|e| ScanError::from_io(path, e))?;
        let root = self
            .canonical_roots
            .iter()
            .find(|root| path_utils::is_descendant(&absolute, root))
            .cloned()
            .unwrap_or_else(path_utils::filesystem_root);
        let record = FileRecord::from_path(&absolute, &root)?;
        log::debug!("Registered canonical file {}", record.path.display());
        self.canonical.add(&record);
        Ok(())
    }

    /// Add one file to the query index without rescanning.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] if the file's metadata cannot be read.
    pub fn append_to_query(&mut self, path: &Path) -> Result<(), ScanError> {
        let record = FileRecord::from_path(path, &path_utils::filesystem_root())?;
        self.query.add(&record);
        Ok(())
    }

    /// Forget the query side and its classification.
    ///
    /// The canonical index and checksum cache are kept.
    pub fn clear_query(&mut self) {
        self.query = AttributeIndex::new();
        self.classification = Classification::default();
    }

    /// Start classifying every query file against the canonical index.
    ///
    /// Any previous classification is discarded.
    pub fn compare(&mut self, options: CompareOptions) -> CompareRun<'_> {
        if options.skip_checksum && !options.use_name {
            log::warn!("Skipping checksums without matching names; size alone decides duplicates");
        }
        self.classification = Classification::default();
        let pending: VecDeque<FileRecord> = self.query.records().cloned().collect();
        log::info!(
            "Comparing {} query file(s) against {} canonical file(s)",
            pending.len(),
            self.canonical.len()
        );
        CompareRun {
            total: pending.len(),
            session: self,
            pending,
            options,
            processed: 0,
            done: false,
        }
    }

    fn classify(&mut self, record: &FileRecord, options: &CompareOptions) {
        let candidates = self.canonical.query(&options.candidate_query(record));
        let results = &mut self.classification;
        results.stats.queried += 1;
        results.stats.candidates += candidates.len();

        if candidates.is_empty() {
            log::debug!("No candidates: {}", record.path.display());
            results.unique.insert(record.path.clone());
            return;
        }

        let only_self = candidates.len() == 1 && candidates.contains(&record.path);
        let mut matched = false;

        for candidate in candidates {
            if candidate == record.path {
                results.skipped_self.insert(candidate);
                continue;
            }
            if options.skip_checksum {
                results.record_duplicate(&record.path, candidate);
                matched = true;
                continue;
            }

            let precomputed = self.cache.lookup(&candidate);
            if precomputed.is_some() {
                results.stats.precomputed_used += 1;
            }
            results.stats.comparisons += 1;

            match self
                .hasher
                .compare_files(&record.path, &candidate, None, precomputed)
            {
                Ok(Some(digest)) => {
                    log::debug!(
                        "{} duplicates {}",
                        record.path.display(),
                        candidate.display()
                    );
                    self.cache.insert(candidate.clone(), digest);
                    self.cache.insert(record.path.clone(), digest);
                    results.record_duplicate(&record.path, candidate);
                    matched = true;
                }
                Ok(None) => {
                    log::trace!("Content differs: {}", candidate.display());
                }
                Err(source) if source.path() == record.path => {
                    self.cache.invalidate(&record.path);
                    results.record_error(ComparisonError::SourceInvalid {
                        path: record.path.clone(),
                        source,
                    });
                }
                Err(source) => {
                    self.cache.invalidate(&candidate);
                    results.record_error(ComparisonError::CandidateInvalid {
                        path: record.path.clone(),
                        candidate,
                        source,
                    });
                }
            }
        }

        // An unreadable query file is still unique when nothing matched.
        if !matched && !only_self {
            results.unique.insert(record.path.clone());
        }
    }

    /// The canonical index.
    #[must_use]
    pub fn canonical(&self) -> &AttributeIndex {
        &self.canonical
    }

    /// The query index.
    #[must_use]
    pub fn query(&self) -> &AttributeIndex {
        &self.query
    }

    /// The most recent classification.
    #[must_use]
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Take ownership of the most recent classification.
    pub fn take_classification(&mut self) -> Classification {
        std::mem::take(&mut self.classification)
    }

    /// Digests learned so far.
    #[must_use]
    pub fn cache(&self) -> &ChecksumCache {
        &self.cache
    }

    /// Mutable access to the digest cache.
    pub fn cache_mut(&mut self) -> &mut ChecksumCache {
        &mut self.cache
    }

    /// The hashing engine used for comparisons.
    #[must_use]
    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    /// Errors met while scanning, in encounter order.
    #[must_use]
    pub fn scan_errors(&self) -> &[ScanError] {
        &self.scan_errors
    }

    /// Take the accumulated scan errors, leaving none.
    pub fn take_scan_errors(&mut self) -> Vec<ScanError> {
        std::mem::take(&mut self.scan_errors)
    }
}

/// Incremental scan into one of the session's indices.
///
/// Yields the number of files indexed so far every `report_frequency` files
/// and once more at the end.
pub struct ScanRun<'a> {
    records: Records,
    index: &'a mut AttributeIndex,
    errors: &'a mut Vec<ScanError>,
    frequency: usize,
    processed: usize,
    done: bool,
}

impl<'a> ScanRun<'a> {
    fn new(
        records: Records,
        index: &'a mut AttributeIndex,
        errors: &'a mut Vec<ScanError>,
        frequency: usize,
    ) -> Self {
        Self {
            records,
            index,
            errors,
            frequency,
            processed: 0,
            done: false,
        }
    }

    /// Run to completion and return the number of files indexed.
    pub fn finish(self) -> usize {
        self.last().unwrap_or(0)
    }
}

impl Iterator for ScanRun<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.done {
            return None;
        }
        for result in self.records.by_ref() {
            match result {
                Ok(record) => {
                    self.index.add(&record);
                    self.processed += 1;
                    if self.processed % self.frequency == 0 {
                        return Some(self.processed);
                    }
                }
                Err(e) => self.errors.push(e),
            }
        }
        self.done = true;
        Some(self.processed)
    }
}

/// Incremental comparison pass over the query index.
///
/// Yields the number of query files classified so far every
/// `report_frequency` files and once more at the end.
pub struct CompareRun<'a> {
    session: &'a mut ComparisonSession,
    pending: VecDeque<FileRecord>,
    options: CompareOptions,
    total: usize,
    processed: usize,
    done: bool,
}

impl CompareRun<'_> {
    /// Number of query files this pass will classify.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Run to completion and return the number of files classified.
    pub fn finish(self) -> usize {
        self.last().unwrap_or(0)
    }
}

impl Iterator for CompareRun<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.done {
            return None;
        }
        while let Some(record) = self.pending.pop_front() {
            self.session.classify(&record, &self.options);
            self.processed += 1;
            if self.processed % self.session.report_frequency == 0 {
                return Some(self.processed);
            }
        }
        self.done = true;
        self.session.classification.stats.cache = self.session.cache.stats();
        Some(self.processed)
    }
}
