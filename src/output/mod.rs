//! Report formatters for compare and copy results.
//!
//! - [`text`]: colored human-readable summary
//! - [`json`]: machine-readable JSON for scripting
//!
//! Both render the same inputs: a [`Classification`](crate::session::Classification)
//! plus a [`CompareSummary`] for `compare`, or a
//! [`CopyReport`](crate::store::CopyReport) for `copy`.

pub mod json;
pub mod text;

use serde::Serialize;

use crate::error::ExitCode;

pub use json::{CompareJson, CopyJson};
pub use text::{write_compare_text, write_copy_text};

/// Totals for the two sides of a compare run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompareSummary {
    /// Files in the canonical index
    pub canonical_files: usize,
    /// Bytes in the canonical index
    pub canonical_bytes: u64,
    /// Files in the query index
    pub query_files: usize,
    /// Bytes in the query index
    pub query_bytes: u64,
    /// Whether Ctrl+C cut the run short
    pub interrupted: bool,
}

/// Exit code for a finished compare run.
///
/// Interruption wins over soft failures, which win over the
/// duplicates/no-duplicates distinction.
#[must_use]
pub fn compare_exit_code(
    classification: &crate::session::Classification,
    summary: &CompareSummary,
    scan_errors: usize,
) -> ExitCode {
    if summary.interrupted {
        ExitCode::Interrupted
    } else if classification.has_errors() || scan_errors > 0 {
        ExitCode::PartialSuccess
    } else if classification.has_duplicates() {
        ExitCode::Success
    } else {
        ExitCode::NoDuplicates
    }
}
