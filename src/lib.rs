//! dedupstore - Content-addressed file deduplication and verified copying
//!
//! Indexes files by their attributes, confirms identity with MD5 digests
//! compared chunk by chunk (stopping at the first differing chunk), and
//! stores each distinct file once in a versioned data root behind a tree
//! of symlinks.

pub mod cache;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod signal;
pub mod store;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::cli::{Cli, Commands, CompareArgs, CopyArgs, OutputFormat};
use crate::config::Config;
use crate::error::ExitCode;
use crate::output::{CompareJson, CompareSummary, CopyJson};
use crate::progress::{Progress, ProgressCallback};
use crate::session::{CompareOptions, ComparisonSession, SessionConfig};
use crate::signal::ShutdownHandler;
use crate::store::{CopyDescriptor, StoreConfig};

/// Run the command described by `cli`.
///
/// Returns the exit code the process should end with. Hard failures
/// (bad arguments, unreadable roots, a failed copy) come back as errors.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the signal handler
/// cannot be installed, or the command fails.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Ok(rendered) = config.to_toml_string() {
        log::debug!("Effective configuration:\n{}", rendered);
    }

    let handler = signal::install_handler().context("Failed to install Ctrl+C handler")?;
    let show_progress = config.progress && !cli.quiet && !cli.no_progress;

    match cli.command {
        Commands::Compare(args) => run_compare(args, &config, &handler, show_progress),
        Commands::Copy(args) => run_copy(args, &config, &handler, show_progress),
    }
}

fn run_compare(
    args: CompareArgs,
    config: &Config,
    handler: &ShutdownHandler,
    show_progress: bool,
) -> Result<ExitCode> {
    for root in &args.canonical {
        if !root.is_dir() {
            bail!("Canonical root is not a directory: {}", root.display());
        }
    }
    for item in &args.query {
        if !item.exists() {
            bail!("Query path not found: {}", item.display());
        }
    }

    let mut scan = config.scan_options();
    scan.skip_hidden_files |= args.skip_hidden;
    scan.skip_hidden_dirs |= args.skip_hidden;
    if args.include_zero_len {
        scan.skip_zero_len = false;
    }
    scan.skip_sub_dir = args.no_recurse;
    scan.include_dir_patterns = args.include_dirs;
    scan.exclude_dir_patterns = args.exclude_dirs;
    scan.include_file_patterns = args.include_files;
    scan.exclude_file_patterns = args.exclude_files;

    let mut session = ComparisonSession::new(SessionConfig::default().with_scan_options(scan))?;
    let reporter = Progress::new(!show_progress);
    let callback: Option<&dyn ProgressCallback> = Some(&reporter);
    let flag = handler.get_flag();
    let shutdown = Some(&*flag);

    let mut interrupted = progress::drive(
        session.scan_canonical(args.canonical),
        progress::PHASE_SCAN_CANONICAL,
        0,
        callback,
        shutdown,
    )
    .interrupted;

    if !interrupted {
        interrupted = progress::drive(
            session.scan_query(args.query),
            progress::PHASE_SCAN_QUERY,
            0,
            callback,
            shutdown,
        )
        .interrupted;
    }

    if !interrupted {
        let options = CompareOptions::default()
            .with_name(args.name)
            .with_type(args.file_type)
            .with_parent(args.parent)
            .with_rel_path(args.rel_path)
            .with_ctime(args.ctime)
            .with_mtime(args.mtime)
            .with_skip_checksum(args.skip_checksum);
        let run = session.compare(options);
        let total = run.total();
        interrupted = progress::drive(run, progress::PHASE_COMPARE, total, callback, shutdown)
            .interrupted;
    }

    for err in session.scan_errors() {
        log::warn!("Skipped during scan: {}", err);
    }

    let summary = CompareSummary {
        canonical_files: session.canonical().len(),
        canonical_bytes: session.canonical().total_size(),
        query_files: session.query().len(),
        query_bytes: session.query().total_size(),
        interrupted,
    };
    let classification = session.classification();
    let exit_code = output::compare_exit_code(classification, &summary, session.scan_errors().len());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Text => output::write_compare_text(&mut out, classification, &summary)?,
        OutputFormat::Json => CompareJson::new(classification, &summary, exit_code).write_to(&mut out)?,
    }
    out.flush()?;

    Ok(exit_code)
}

fn run_copy(
    args: CopyArgs,
    config: &Config,
    handler: &ShutdownHandler,
    show_progress: bool,
) -> Result<ExitCode> {
    let mut store_config: StoreConfig = config
        .store_config()
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(Arc::new(Progress::new(!show_progress)));
    if let Some(prefix) = args.prefix {
        store_config = store_config.with_version_prefix(prefix);
    }
    if let Some(digits) = args.digits {
        store_config = store_config.with_version_digits(digits);
    }
    if args.verify {
        store_config = store_config.with_verify(true);
    }

    let descriptors = build_descriptors(&args.sources, &args.relative_dir, args.link_in_place)?;
    log::info!("Copying {} file(s)", descriptors.len());

    let report = match store::copy_batch(&descriptors, &args.dest, &args.data, &store_config) {
        Ok(report) => report,
        Err(err) => {
            for entry in &err.report.entries {
                log::warn!(
                    "Completed before the failure: {} -> {}",
                    entry.destination.display(),
                    entry.stored.display()
                );
            }
            return Err(err.error.into());
        }
    };
    let exit_code = if report.interrupted {
        ExitCode::Interrupted
    } else {
        ExitCode::Success
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Text => output::write_copy_text(&mut out, &report)?,
        OutputFormat::Json => CopyJson::new(&report, exit_code).write_to(&mut out)?,
    }
    out.flush()?;

    Ok(exit_code)
}

/// Directory contents are mirrored below `relative_dir`; files land
/// directly in it.
fn build_descriptors(
    sources: &[PathBuf],
    relative_dir: &std::path::Path,
    link_in_place: bool,
) -> Result<Vec<CopyDescriptor>> {
    let mut descriptors = Vec::new();
    let mut files = Vec::new();
    for source in sources {
        if source.is_dir() {
            for mut descriptor in store::dir_to_descriptors(source, link_in_place)? {
                descriptor.destination = relative_dir.join(&descriptor.destination);
                descriptors.push(descriptor);
            }
        } else {
            files.push(source.clone());
        }
    }
    descriptors.extend(store::files_to_descriptors(&files, relative_dir, link_in_place));
    Ok(descriptors)
}
