//! Comparison results: per-file verdicts plus the soft failures met on the way.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache::CacheStats;
use crate::checksum::ChecksumError;

/// A file vanished or changed type between scanning and comparison.
///
/// These are recorded and the comparison pass moves on to the next
/// candidate; they never abort the pass.
#[derive(thiserror::Error, Debug)]
pub enum ComparisonError {
    /// The query file itself could not be read.
    #[error("Source file became invalid: {path}: {source}")]
    SourceInvalid {
        /// Query file
        path: PathBuf,
        /// Why it could not be compared
        #[source]
        source: ChecksumError,
    },

    /// A canonical candidate could not be read.
    #[error("Candidate {candidate} for {path} became invalid: {source}")]
    CandidateInvalid {
        /// Query file being classified
        path: PathBuf,
        /// Canonical file that failed
        candidate: PathBuf,
        /// Why it could not be compared
        #[source]
        source: ChecksumError,
    },
}

impl ComparisonError {
    /// The file that could not be read.
    #[must_use]
    pub fn offending_path(&self) -> &Path {
        match self {
            Self::SourceInvalid { path, .. } => path,
            Self::CandidateInvalid { candidate, .. } => candidate,
        }
    }
}

/// Final state of one query file after a compare pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// No candidate matched, including query files that could not be read.
    Unique,
    /// At least one other canonical file matched.
    Duplicate,
    /// The only candidate was the file itself.
    ImplicitlyPresent,
}

/// Counters gathered during a compare pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompareStats {
    /// Query files classified
    pub queried: usize,
    /// Candidates returned by the canonical index, summed over all query files
    pub candidates: usize,
    /// Content comparisons performed
    pub comparisons: usize,
    /// Comparisons that could reuse a cached candidate digest
    pub precomputed_used: usize,
    /// Checksum cache counters at the end of the pass
    pub cache: CacheStats,
}

/// Outcome of classifying the query set against the canonical set.
///
/// Holds the successful verdicts and every per-file failure side by side,
/// so a partially successful pass still reports everything it learned.
#[derive(Debug, Default)]
pub struct Classification {
    /// Query path → matching canonical paths, smallest path first.
    pub duplicates: BTreeMap<PathBuf, Vec<PathBuf>>,
    /// Query paths with no verified match.
    pub unique: BTreeSet<PathBuf>,
    /// Query paths that were found among their own candidates.
    pub skipped_self: BTreeSet<PathBuf>,
    /// Query paths that could not be read. They are also in `unique` unless
    /// some comparison matched before the failure.
    pub source_error_files: BTreeSet<PathBuf>,
    /// Canonical paths that could not be read.
    pub possible_match_error_files: BTreeSet<PathBuf>,
    /// Details of every soft failure, in encounter order.
    pub errors: Vec<ComparisonError>,
    /// Pass counters.
    pub stats: CompareStats,
}

impl Classification {
    /// The verdict reached for `path`, if it was classified.
    #[must_use]
    pub fn verdict(&self, path: &Path) -> Option<Verdict> {
        if self.duplicates.contains_key(path) {
            Some(Verdict::Duplicate)
        } else if self.unique.contains(path) {
            Some(Verdict::Unique)
        } else if self.skipped_self.contains(path) {
            Some(Verdict::ImplicitlyPresent)
        } else {
            None
        }
    }

    /// The first (smallest) canonical match for `path`.
    #[must_use]
    pub fn first_match(&self, path: &Path) -> Option<&Path> {
        self.duplicates
            .get(path)
            .and_then(|matches| matches.first())
            .map(PathBuf::as_path)
    }

    /// Whether any query file matched another file.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }

    /// Whether any soft failure was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub(crate) fn record_duplicate(&mut self, path: &Path, candidate: PathBuf) {
        self.duplicates
            .entry(path.to_path_buf())
            .or_default()
            .push(candidate);
    }

    pub(crate) fn record_error(&mut self, error: ComparisonError) {
        log::warn!("{}", error);
        match &error {
            ComparisonError::SourceInvalid { path, .. } => {
                self.source_error_files.insert(path.clone());
            }
            ComparisonError::CandidateInvalid { candidate, .. } => {
                self.possible_match_error_files.insert(candidate.clone());
            }
        }
        self.errors.push(error);
    }
}
