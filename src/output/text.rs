//! Human-readable summaries.
//!
//! Colors come from yansi and respect `--no-color` / `NO_COLOR`, which
//! disable painting globally before anything is printed.

use std::fs;
use std::io::Write;

use bytesize::ByteSize;
use yansi::Paint;

use super::CompareSummary;
use crate::session::Classification;
use crate::store::{CopyOutcome, CopyReport};

/// Write the compare report.
///
/// Every query file appears under its verdict. Failures are listed last so
/// they stay visible at the bottom of the terminal; an unreadable query file
/// shows up there as well as under UNIQUE.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_compare_text<W: Write>(
    writer: &mut W,
    classification: &Classification,
    summary: &CompareSummary,
) -> std::io::Result<()> {
    for (path, matches) in &classification.duplicates {
        writeln!(writer, "{} {}", "DUPLICATE".yellow().bold(), path.display())?;
        for m in matches {
            writeln!(writer, "    = {}", m.display().dim())?;
        }
    }
    for path in &classification.unique {
        writeln!(writer, "{} {}", "UNIQUE".green().bold(), path.display())?;
    }
    for path in &classification.skipped_self {
        writeln!(writer, "{} {}", "PRESENT".cyan(), path.display())?;
    }
    for error in &classification.errors {
        writeln!(writer, "{} {}", "ERROR".red().bold(), error)?;
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "Canonical: {} files ({})   Query: {} files ({})",
        summary.canonical_files,
        ByteSize::b(summary.canonical_bytes),
        summary.query_files,
        ByteSize::b(summary.query_bytes),
    )?;
    writeln!(
        writer,
        "{} duplicate, {} unique, {} already present, {} unreadable",
        classification.duplicates.len().bold(),
        classification.unique.len().bold(),
        classification.skipped_self.len(),
        classification.source_error_files.len(),
    )?;
    let stats = &classification.stats;
    writeln!(
        writer,
        "{} comparisons over {} candidates, cache {} hits / {} misses",
        stats.comparisons, stats.candidates, stats.cache.hits, stats.cache.misses
    )?;
    if summary.interrupted {
        writeln!(writer, "{}", "Interrupted: results are partial".red())?;
    }
    Ok(())
}

/// Write the copy report.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_copy_text<W: Write>(writer: &mut W, report: &CopyReport) -> std::io::Result<()> {
    let mut copied_bytes = 0u64;
    for entry in &report.entries {
        let label = match entry.outcome {
            CopyOutcome::Copied => {
                copied_bytes += fs::metadata(&entry.stored).map(|m| m.len()).unwrap_or(0);
                "COPIED".green().bold()
            }
            CopyOutcome::Reused => "REUSED".yellow().bold(),
            CopyOutcome::LinkedInPlace => "LINKED".cyan().bold(),
        };
        writeln!(
            writer,
            "{} {} -> {}",
            label,
            entry.destination.display(),
            entry.stored.display().dim()
        )?;
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "{} copied ({}), {} reused, {} linked in place",
        report.copied().bold(),
        ByteSize::b(copied_bytes),
        report.reused().bold(),
        report.linked_in_place(),
    )?;
    if report.interrupted {
        writeln!(writer, "{}", "Interrupted: batch is incomplete".red())?;
    }
    Ok(())
}
