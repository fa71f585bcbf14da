//! Command-line interface definitions for dedupstore.
//!
//! Two subcommands share a set of global options (verbosity, color, config
//! file, error format):
//!
//! ```bash
//! # Which incoming files are already in the library?
//! dedupstore compare --canonical ~/library/data ~/Downloads
//!
//! # Same, but trust name + size instead of reading contents
//! dedupstore compare --canonical ~/library/data --name --skip-checksum ~/Downloads
//!
//! # Store files once and link them into a browsable tree
//! dedupstore copy --data ~/library/data --dest ~/library/view --relative-dir 2024 a.jpg b.jpg
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Content-addressed deduplicating copy tool.
///
/// Finds files whose bytes already exist in a canonical directory, and
/// copies new files into a versioned store exactly once, exposing them
/// through a tree of symlinks.
#[derive(Debug, Parser)]
#[command(name = "dedupstore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print failures as a JSON object on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Read settings from this TOML file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify files as duplicates of canonical files, or unique
    Compare(CompareArgs),
    /// Copy files into a deduplicated store and link them into a tree
    Copy(CopyArgs),
}

/// Arguments for the compare subcommand.
#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Files and directories to classify
    #[arg(value_name = "QUERY", required = true)]
    pub query: Vec<PathBuf>,

    /// Canonical directory to compare against (repeatable)
    #[arg(long, value_name = "DIR", required = true)]
    pub canonical: Vec<PathBuf>,

    /// Candidates must share the file name
    #[arg(long)]
    pub name: bool,

    /// Candidates must share the extension
    #[arg(long = "type")]
    pub file_type: bool,

    /// Candidates must share the parent directory name
    #[arg(long)]
    pub parent: bool,

    /// Candidates must share the path relative to their scan root
    #[arg(long)]
    pub rel_path: bool,

    /// Candidates must share the ctime
    #[arg(long)]
    pub ctime: bool,

    /// Candidates must share the mtime
    #[arg(long)]
    pub mtime: bool,

    /// Treat matching attributes as proof of identical content
    ///
    /// Much faster, but only as reliable as the attributes chosen.
    #[arg(long, requires = "name")]
    pub skip_checksum: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Include zero-length files
    #[arg(long)]
    pub include_zero_len: bool,

    /// Only look at the top level of each directory
    #[arg(long)]
    pub no_recurse: bool,

    /// Only descend into directories whose name matches (regex, repeatable)
    #[arg(long = "include-dir", value_name = "REGEX")]
    pub include_dirs: Vec<String>,

    /// Never descend into directories whose name matches (regex, repeatable)
    #[arg(long = "exclude-dir", value_name = "REGEX")]
    pub exclude_dirs: Vec<String>,

    /// Only consider files whose name matches (regex, repeatable)
    #[arg(long = "include-file", value_name = "REGEX")]
    pub include_files: Vec<String>,

    /// Ignore files whose name matches (regex, repeatable)
    #[arg(long = "exclude-file", value_name = "REGEX")]
    pub exclude_files: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the copy subcommand.
#[derive(Debug, Args)]
pub struct CopyArgs {
    /// Files or directories to copy
    #[arg(value_name = "SOURCE", required = true)]
    pub sources: Vec<PathBuf>,

    /// Root of the symlink tree
    #[arg(long, value_name = "DIR")]
    pub dest: PathBuf,

    /// Root of the physical store
    #[arg(long, value_name = "DIR")]
    pub data: PathBuf,

    /// Subdirectory of the tree that file sources are linked into
    #[arg(long, value_name = "REL", default_value = "", value_parser = |s: &str| Ok::<PathBuf, std::convert::Infallible>(PathBuf::from(s)))]
    pub relative_dir: PathBuf,

    /// Link straight to the sources instead of storing them
    #[arg(long)]
    pub link_in_place: bool,

    /// Re-hash every copy after writing it
    #[arg(long)]
    pub verify: bool,

    /// Version prefix in stored names (default from config: "v")
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Version number width (default from config: 4)
    #[arg(long, value_name = "N")]
    pub digits: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Machine-readable JSON on stdout
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
