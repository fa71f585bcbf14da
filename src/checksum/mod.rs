//! Streaming MD5 checksums with early-exit file comparison.
//!
//! # Overview
//!
//! Content identity is the MD5 digest of a file's bytes, displayed as 32
//! lowercase hex characters. Files are read in fixed [`CHUNK_SIZE`] blocks
//! (128 MD5 blocks), so memory use is constant regardless of file size.
//!
//! [`Hasher::compare_parallel`] walks two files in lockstep and compares the
//! cumulative digest after every chunk. The cumulative digest over the first
//! `n` bytes differs as soon as the files differ anywhere in that prefix, so a
//! mismatch is detected within the chunk that holds the first differing byte
//! and neither file is read any further.
//!
//! Only regular files are hashed. Symlinks, directories and missing paths are
//! rejected with a validation error; resolving links is the caller's job.
//!
//! # Example
//!
//! ```no_run
//! use dedupstore::checksum::Hasher;
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! match hasher.compare_files(Path::new("a.bin"), Path::new("b.bin"), None, None) {
//!     Ok(Some(digest)) => println!("identical: {}", digest),
//!     Ok(None) => println!("different"),
//!     Err(e) => eprintln!("cannot compare: {}", e),
//! }
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use md5::{Digest, Md5};
use serde::{Serialize, Serializer};

/// Bytes read per step: 128 × the 64-byte MD5 block.
pub const CHUNK_SIZE: usize = 128 * 64;

/// A 16-byte MD5 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 16]);

impl Checksum {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// 32-character lowercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Digest of the empty input.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_hasher(Md5::new())
    }

    fn from_hasher(hasher: Md5) -> Self {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl FromStr for Checksum {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Errors that can occur while hashing or comparing files.
#[derive(thiserror::Error, Debug)]
pub enum ChecksumError {
    /// The path does not exist.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// The path is a directory.
    #[error("Is a directory: {0}")]
    IsDirectory(PathBuf),

    /// The path is a symbolic link.
    #[error("Is a symbolic link: {0}")]
    IsSymlink(PathBuf),

    /// The path is neither a regular file, a directory nor a link.
    #[error("Not a regular file: {0}")]
    NotRegular(PathBuf),

    /// Reading the file failed.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path being read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ChecksumError {
    /// Whether this is an input validation failure rather than an I/O fault.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }

    /// The path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path)
            | Self::IsDirectory(path)
            | Self::IsSymlink(path)
            | Self::NotRegular(path)
            | Self::Io { path, .. } => path,
        }
    }

    fn from_io(path: &Path, error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::NotFound {
            log::debug!("File not found (may have been deleted): {}", path.display());
            Self::NotFound(path.to_path_buf())
        } else {
            log::warn!("Failed to read {}: {}", path.display(), error);
            Self::Io {
                path: path.to_path_buf(),
                source: error,
            }
        }
    }
}

/// Check that `path` is an existing regular file that is not a symlink.
///
/// Returns the file size on success.
///
/// # Errors
///
/// Returns the matching [`ChecksumError`] validation variant.
pub fn validate_regular_file(path: &Path) -> Result<u64, ChecksumError> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| ChecksumError::from_io(path, e))?;
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        Err(ChecksumError::IsSymlink(path.to_path_buf()))
    } else if file_type.is_dir() {
        Err(ChecksumError::IsDirectory(path.to_path_buf()))
    } else if !file_type.is_file() {
        Err(ChecksumError::NotRegular(path.to_path_buf()))
    } else {
        Ok(metadata.len())
    }
}

/// Lazy sequence of cumulative digests, one per chunk read.
///
/// Finite and not restartable. An empty file yields nothing.
pub struct DigestStream {
    path: PathBuf,
    file: Option<File>,
    hasher: Md5,
    buffer: Vec<u8>,
    bytes_read: u64,
    latest: Checksum,
}

impl fmt::Debug for DigestStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestStream")
            .field("path", &self.path)
            .field("bytes_read", &self.bytes_read)
            .field("latest", &self.latest)
            .finish()
    }
}

impl DigestStream {
    /// Bytes consumed so far.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The most recent cumulative digest (the empty digest before any read).
    #[must_use]
    pub fn latest(&self) -> Checksum {
        self.latest
    }

    /// Fill the buffer as far as possible; short only at end of file.
    fn read_chunk(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buffer.len() {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl Iterator for DigestStream {
    type Item = Result<Checksum, ChecksumError>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.file.as_mut()?;
        match Self::read_chunk(file, &mut self.buffer) {
            Ok(0) => {
                self.file = None;
                None
            }
            Ok(n) => {
                self.hasher.update(&self.buffer[..n]);
                self.bytes_read += n as u64;
                self.latest = Checksum::from_hasher(self.hasher.clone());
                Some(Ok(self.latest))
            }
            Err(e) => {
                self.file = None;
                Some(Err(ChecksumError::from_io(&self.path, e)))
            }
        }
    }
}

/// Result of a lockstep comparison, with how far each side was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParallelOutcome {
    pub matched: Option<Checksum>,
    pub bytes_read_a: u64,
    pub bytes_read_b: u64,
}

/// MD5 hashing engine.
///
/// Counts how many files it has opened so callers (and tests) can observe
/// how much I/O a comparison cost.
#[derive(Debug)]
pub struct Hasher {
    chunk_size: usize,
    files_opened: AtomicU64,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher reading [`CHUNK_SIZE`] bytes at a time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_size(CHUNK_SIZE)
    }

    /// Create a hasher with a custom chunk size (at least 1 byte).
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            files_opened: AtomicU64::new(0),
        }
    }

    /// Bytes read per step.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of files opened for hashing so far.
    #[must_use]
    pub fn files_opened(&self) -> u64 {
        self.files_opened.load(Ordering::Relaxed)
    }

    /// Open `path` as a stream of cumulative digests.
    ///
    /// # Errors
    ///
    /// Fails validation if `path` is missing, a directory, or a symlink.
    pub fn digest_stream(&self, path: &Path) -> Result<DigestStream, ChecksumError> {
        validate_regular_file(path)?;
        let file = File::open(path).map_err(|e| ChecksumError::from_io(path, e))?;
        self.files_opened.fetch_add(1, Ordering::Relaxed);
        Ok(DigestStream {
            path: path.to_path_buf(),
            file: Some(file),
            hasher: Md5::new(),
            buffer: vec![0u8; self.chunk_size],
            bytes_read: 0,
            latest: Checksum::empty(),
        })
    }

    /// Digest the full contents of `path`.
    ///
    /// # Errors
    ///
    /// Fails validation if `path` is missing, a directory, or a symlink, or
    /// with [`ChecksumError::Io`] if reading fails.
    pub fn hash_file(&self, path: &Path) -> Result<Checksum, ChecksumError> {
        let mut stream = self.digest_stream(path)?;
        for step in stream.by_ref() {
            step?;
        }
        log::trace!("Hashed {} ({} bytes)", path.display(), stream.bytes_read());
        Ok(stream.latest())
    }

    /// Compare two files chunk by chunk, stopping at the first differing
    /// cumulative digest.
    ///
    /// Returns the shared digest when the files are identical, `None`
    /// otherwise. Streams of different length never match.
    ///
    /// # Errors
    ///
    /// Propagates validation and I/O errors from either file.
    pub fn compare_parallel(&self, a: &Path, b: &Path) -> Result<Option<Checksum>, ChecksumError> {
        Ok(self.compare_parallel_counted(a, b)?.matched)
    }

    pub(crate) fn compare_parallel_counted(
        &self,
        a: &Path,
        b: &Path,
    ) -> Result<ParallelOutcome, ChecksumError> {
        let mut stream_a = self.digest_stream(a)?;
        let mut stream_b = self.digest_stream(b)?;

        let matched = loop {
            match (stream_a.next(), stream_b.next()) {
                (None, None) => break Some(stream_a.latest()),
                (Some(step_a), Some(step_b)) => {
                    if step_a? != step_b? {
                        log::trace!(
                            "Early mismatch after {} bytes: {} vs {}",
                            stream_a.bytes_read(),
                            a.display(),
                            b.display()
                        );
                        break None;
                    }
                }
                _ => break None,
            }
        };

        Ok(ParallelOutcome {
            matched,
            bytes_read_a: stream_a.bytes_read(),
            bytes_read_b: stream_b.bytes_read(),
        })
    }

    /// Decide whether two files hold identical bytes.
    ///
    /// `precomputed_a` / `precomputed_b` are digests the caller already
    /// trusts for either side. When neither is given the files are compared
    /// in lockstep; otherwise only the missing digest is computed.
    ///
    /// Comparing a path to itself hashes it exactly once. Files of different
    /// sizes are rejected without reading either.
    ///
    /// # Errors
    ///
    /// Fails validation if either path is missing, a directory, or a symlink.
    pub fn compare_files(
        &self,
        a: &Path,
        b: &Path,
        precomputed_a: Option<Checksum>,
        precomputed_b: Option<Checksum>,
    ) -> Result<Option<Checksum>, ChecksumError> {
        let size_a = validate_regular_file(a)?;
        let size_b = validate_regular_file(b)?;

        if a == b {
            return self.hash_file(a).map(Some);
        }
        if size_a != size_b {
            return Ok(None);
        }
        if precomputed_a.is_none() && precomputed_b.is_none() {
            return self.compare_parallel(a, b);
        }

        let digest_a = match precomputed_a {
            Some(digest) => digest,
            None => self.hash_file(a)?,
        };
        let digest_b = match precomputed_b {
            Some(digest) => digest,
            None => self.hash_file(b)?,
        };
        Ok((digest_a == digest_b).then_some(digest_a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_known_digests() {
        let dir = TempDir::new().unwrap();
        let hasher = Hasher::new();

        let empty = write(&dir, "empty", b"");
        assert_eq!(
            hasher.hash_file(&empty).unwrap().to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );

        let hello = write(&dir, "hello", b"hello");
        assert_eq!(
            hasher.hash_file(&hello).unwrap().to_string(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_hash_spans_multiple_chunks() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let path = write(&dir, "big", &data);

        let small_chunks = Hasher::with_chunk_size(100);
        assert_eq!(
            Hasher::new().hash_file(&path).unwrap(),
            small_chunks.hash_file(&path).unwrap()
        );
    }

    #[test]
    fn test_digest_stream_yields_one_digest_per_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "f", &vec![7u8; CHUNK_SIZE * 2 + 1]);
        let hasher = Hasher::new();

        let digests: Vec<_> = hasher
            .digest_stream(&path)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(digests.len(), 3);
        assert_eq!(digests[2], hasher.hash_file(&path).unwrap());
        assert_ne!(digests[0], digests[1]);
    }

    #[test]
    fn test_hash_rejects_directory_and_missing() {
        let dir = TempDir::new().unwrap();
        let hasher = Hasher::new();

        let err = hasher.hash_file(dir.path()).unwrap_err();
        assert!(matches!(err, ChecksumError::IsDirectory(_)));
        assert!(err.is_validation());

        let err = hasher.hash_file(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ChecksumError::NotFound(_)));
        assert!(err.is_validation());
    }

    #[test]
    #[cfg(unix)]
    fn test_hash_rejects_symlink() {
        let dir = TempDir::new().unwrap();
        let target = write(&dir, "target", b"data");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = Hasher::new().hash_file(&link).unwrap_err();
        assert!(matches!(err, ChecksumError::IsSymlink(_)));
        assert_eq!(err.path(), link.as_path());
    }

    #[test]
    fn test_compare_identical_returns_full_digest() {
        let dir = TempDir::new().unwrap();
        let content = vec![42u8; CHUNK_SIZE + 500];
        let a = write(&dir, "a", &content);
        let b = write(&dir, "b", &content);
        let hasher = Hasher::new();

        let digest = hasher.compare_files(&a, &b, None, None).unwrap();
        assert_eq!(digest, Some(hasher.hash_file(&a).unwrap()));
    }

    #[test]
    fn test_compare_different_content() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"hello");
        let b = write(&dir, "b", b"world");
        assert_eq!(Hasher::new().compare_files(&a, &b, None, None).unwrap(), None);
    }

    #[test]
    fn test_compare_empty_files_match() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"");
        let b = write(&dir, "b", b"");
        assert_eq!(
            Hasher::new().compare_files(&a, &b, None, None).unwrap(),
            Some(Checksum::empty())
        );
    }

    #[test]
    fn test_compare_size_mismatch_reads_nothing() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"short");
        let b = write(&dir, "b", b"much longer");
        let hasher = Hasher::new();

        assert_eq!(hasher.compare_files(&a, &b, None, None).unwrap(), None);
        assert_eq!(hasher.files_opened(), 0);
    }

    #[test]
    fn test_compare_same_path_hashes_once() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"self comparison");
        let hasher = Hasher::new();

        let digest = hasher.compare_files(&a, &a, None, None).unwrap();
        assert_eq!(hasher.files_opened(), 1);
        assert_eq!(digest, Some(Hasher::new().hash_file(&a).unwrap()));
    }

    #[test]
    fn test_compare_with_precomputed_digest() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"same bytes");
        let b = write(&dir, "b", b"same bytes");
        let hasher = Hasher::new();
        let known = Hasher::new().hash_file(&b).unwrap();

        assert_eq!(
            hasher.compare_files(&a, &b, None, Some(known)).unwrap(),
            Some(known)
        );
        // Only the side without a digest was read.
        assert_eq!(hasher.files_opened(), 1);

        // A stale precomputed digest is trusted as given.
        let stale = Checksum::from_bytes([0u8; 16]);
        assert_eq!(hasher.compare_files(&a, &b, None, Some(stale)).unwrap(), None);
    }

    #[test]
    fn test_compare_rejects_invalid_candidate() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", b"x");
        let err = Hasher::new()
            .compare_files(&a, &dir.path().join("gone"), None, None)
            .unwrap_err();
        assert!(matches!(err, ChecksumError::NotFound(ref p) if p.ends_with("gone")));
    }

    #[test]
    fn test_parallel_exits_in_first_differing_chunk() {
        let dir = TempDir::new().unwrap();
        let len = CHUNK_SIZE * 10;
        let base = vec![1u8; len];
        let a = write(&dir, "a", &base);

        for offset in [0, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE * 4 + 123, len - 1] {
            let mut other = base.clone();
            other[offset] = 2;
            let b = write(&dir, "b", &other);

            let outcome = Hasher::new().compare_parallel_counted(&a, &b).unwrap();
            let limit = ((offset / CHUNK_SIZE) + 1) * CHUNK_SIZE;
            assert_eq!(outcome.matched, None);
            assert!(outcome.bytes_read_a <= limit as u64, "offset {}", offset);
            assert!(outcome.bytes_read_b <= limit as u64, "offset {}", offset);
        }
    }

    #[test]
    fn test_parallel_uneven_lengths_never_match() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a", &vec![3u8; CHUNK_SIZE]);
        let b = write(&dir, "b", &vec![3u8; CHUNK_SIZE + 1]);
        assert_eq!(Hasher::new().compare_parallel(&a, &b).unwrap(), None);
    }

    #[test]
    fn test_checksum_hex_round_trip_and_serialize() {
        let digest: Checksum = "5d41402abc4b2a76b9719d911017c592".parse().unwrap();
        assert_eq!(digest.to_hex(), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(
            serde_json::to_string(&digest).unwrap(),
            "\"5d41402abc4b2a76b9719d911017c592\""
        );
        assert!("xyz".parse::<Checksum>().is_err());
    }
}
