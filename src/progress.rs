//! Progress reporting utilities using indicatif.
//!
//! Scans and comparisons are incremental iterators that yield a running
//! count. [`drive`] pulls one of them to completion, forwarding each count to
//! a [`ProgressCallback`] and stopping early when a shutdown flag is raised.
//! [`Progress`] is the terminal implementation of the callback.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, progress reporting uses simplified output:
//! - No spinners or animations
//! - Plain text updates without cursor movement
//! - Reduced update frequency for screen reader compatibility

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Phase name for canonical scans.
pub const PHASE_SCAN_CANONICAL: &str = "scan-canonical";
/// Phase name for query scans.
pub const PHASE_SCAN_QUERY: &str = "scan-query";
/// Phase name for comparison passes.
pub const PHASE_COMPARE: &str = "compare";
/// Phase name for batch copies.
pub const PHASE_COPY: &str = "copy";

/// Progress callback for scan, compare and copy phases.
///
/// Implement this trait to receive progress updates while the session
/// and store work.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "scan-canonical", "compare")
    /// * `total` - Total number of items to process, 0 if unknown
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called with the running count of processed items.
    ///
    /// # Arguments
    ///
    /// * `current` - Items processed so far
    /// * `path` - Path being processed, empty if not tracked
    fn on_progress(&self, current: usize, path: &str);

    /// Called when a phase completes.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Result of [`drive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveOutcome {
    /// Last count reported by the operation
    pub processed: usize,
    /// Whether the shutdown flag stopped the operation early
    pub interrupted: bool,
}

/// Pull an incremental operation to completion.
///
/// Every yielded count is forwarded to `callback`. The shutdown flag is
/// checked between steps; once it is set the operation is dropped where it
/// stands and the outcome is marked interrupted.
pub fn drive<I>(
    operation: I,
    phase: &str,
    total: usize,
    callback: Option<&dyn ProgressCallback>,
    shutdown: Option<&AtomicBool>,
) -> DriveOutcome
where
    I: Iterator<Item = usize>,
{
    let mut outcome = DriveOutcome::default();
    if let Some(cb) = callback {
        cb.on_phase_start(phase, total);
    }
    for count in operation {
        outcome.processed = count;
        if let Some(cb) = callback {
            cb.on_progress(count, "");
        }
        if shutdown.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            log::info!("Shutdown requested during {}", phase);
            outcome.interrupted = true;
            break;
        }
    }
    if let Some(cb) = callback {
        cb.on_phase_end(phase);
    }
    outcome
}

/// Progress reporter using indicatif.
///
/// Keeps one bar per active phase. Phases with a known total get a bar,
/// the rest a spinner.
pub struct Progress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("quiet", &self.quiet)
            .field("accessible", &self.accessible)
            .finish_non_exhaustive()
    }
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, nothing is displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use dedupstore::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self::with_accessible(quiet, false)
    }

    /// Create a new progress reporter with accessible mode.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, nothing is displayed.
    /// * `accessible` - If true, uses simplified output for screen readers.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            quiet,
            accessible,
        }
    }

    /// Check if accessible mode is enabled.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    fn spinner_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template("{msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        } else {
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        }
    }

    fn bar_style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        } else {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
        }
    }

    fn label(phase: &str) -> &str {
        match phase {
            PHASE_SCAN_CANONICAL => "Scanning canonical files",
            PHASE_SCAN_QUERY => "Scanning query files",
            PHASE_COMPARE => "Comparing",
            PHASE_COPY => "Copying",
            other => other,
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let pb = if total == 0 {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(self.spinner_style());
            let tick_rate = if self.accessible { 500 } else { 100 };
            pb.enable_steady_tick(Duration::from_millis(tick_rate));
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(self.bar_style());
            pb
        };
        pb.set_message(Self::label(phase).to_string());
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(phase.to_string(), pb);
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        if let Ok(bars) = self.bars.lock() {
            for pb in bars.values() {
                pb.set_position(current as u64);
                if !path.is_empty() {
                    pb.set_message(truncate_path(path, 30));
                }
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let finished = self.bars.lock().ok().and_then(|mut bars| bars.remove(phase));
        if let Some(pb) = finished {
            pb.finish_with_message(format!("{} complete", Self::label(phase)));
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        if let Ok(bars) = self.bars.lock() {
            for pb in bars.values() {
                pb.set_message(message.to_string());
            }
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.len() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if file_name.chars().count() >= max_len {
        let tail: String = file_name
            .chars()
            .rev()
            .take(max_len.saturating_sub(3))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return format!("...{}", tail);
    }

    format!(".../{}", file_name)
}
