//! JSON output for compare and copy results.
//!
//! # Compare schema
//!
//! ```json
//! {
//!   "generated_at": "2024-05-01T12:00:00Z",
//!   "duplicates": [
//!     { "path": "/incoming/a.jpg", "matches": ["/library/a.jpg"] }
//!   ],
//!   "unique": ["/incoming/b.jpg"],
//!   "implicitly_present": [],
//!   "source_errors": [],
//!   "possible_match_errors": [],
//!   "errors": [],
//!   "stats": { "queried": 2, "candidates": 1, "comparisons": 1, ... },
//!   "summary": { "canonical_files": 10, ..., "exit_code": 0, "exit_code_name": "DS000" }
//! }
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::CompareSummary;
use crate::error::ExitCode;
use crate::session::{Classification, CompareStats};
use crate::store::{CopyEntry, CopyReport};

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn path_strings<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Vec<String> {
    paths.into_iter().map(|p| path_string(p)).collect()
}

/// One query file and the canonical files it matched.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicate {
    /// Query file
    pub path: String,
    /// Matching canonical files, smallest path first
    pub matches: Vec<String>,
}

/// Run totals plus the exit code.
#[derive(Debug, Clone, Serialize)]
pub struct JsonCompareSummary {
    #[serde(flatten)]
    totals: CompareSummary,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DS000")
    pub exit_code_name: String,
}

/// Complete JSON output for `compare`.
#[derive(Debug, Clone, Serialize)]
pub struct CompareJson {
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// Query files with at least one match
    pub duplicates: Vec<JsonDuplicate>,
    /// Query files with no match
    pub unique: Vec<String>,
    /// Query files whose only candidate was themselves
    pub implicitly_present: Vec<String>,
    /// Query files that could not be read
    pub source_errors: Vec<String>,
    /// Canonical files that could not be read
    pub possible_match_errors: Vec<String>,
    /// Messages for every soft failure
    pub errors: Vec<String>,
    /// Comparison counters
    pub stats: CompareStats,
    /// Totals and exit code
    pub summary: JsonCompareSummary,
}

impl CompareJson {
    /// Build the JSON view of a classification.
    #[must_use]
    pub fn new(classification: &Classification, summary: &CompareSummary, exit_code: ExitCode) -> Self {
        Self {
            generated_at: Utc::now(),
            duplicates: classification
                .duplicates
                .iter()
                .map(|(path, matches)| JsonDuplicate {
                    path: path_string(path),
                    matches: path_strings(matches),
                })
                .collect(),
            unique: path_strings(&classification.unique),
            implicitly_present: path_strings(&classification.skipped_self),
            source_errors: path_strings(&classification.source_error_files),
            possible_match_errors: path_strings(&classification.possible_match_error_files),
            errors: classification.errors.iter().map(ToString::to_string).collect(),
            stats: classification.stats,
            summary: JsonCompareSummary {
                totals: *summary,
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writeln!(writer)?;
        Ok(())
    }
}

/// Batch totals plus the exit code.
#[derive(Debug, Clone, Serialize)]
pub struct JsonCopySummary {
    /// Descriptors that wrote new bytes
    pub copied: usize,
    /// Descriptors that reused stored bytes
    pub reused: usize,
    /// Descriptors linked straight to their source
    pub linked_in_place: usize,
    /// Whether Ctrl+C cut the batch short
    pub interrupted: bool,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name
    pub exit_code_name: String,
}

/// Complete JSON output for `copy`.
#[derive(Debug, Clone, Serialize)]
pub struct CopyJson<'a> {
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// Per-descriptor results
    pub entries: &'a [CopyEntry],
    /// Totals and exit code
    pub summary: JsonCopySummary,
}

impl<'a> CopyJson<'a> {
    /// Build the JSON view of a copy report.
    #[must_use]
    pub fn new(report: &'a CopyReport, exit_code: ExitCode) -> Self {
        Self {
            generated_at: Utc::now(),
            entries: &report.entries,
            summary: JsonCopySummary {
                copied: report.copied(),
                reused: report.reused(),
                linked_in_place: report.linked_in_place(),
                interrupted: report.interrupted,
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writeln!(writer)?;
        Ok(())
    }
}
