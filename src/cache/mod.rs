//! Per-session checksum cache.
//!
//! Maps absolute paths to the last digest computed for them during one
//! comparison session. Nothing is persisted: the store directory is rescanned
//! on every run, and a cache that outlived the files it describes would only
//! be a source of stale answers.
//!
//! Entries are added as comparisons succeed. A canonical file that matches
//! several query files is then read once, and every later comparison against
//! it only has to hash the query side.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::checksum::Checksum;

/// Hit/miss counters for a [`ChecksumCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found a digest
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
}

/// Path → digest map scoped to one session.
#[derive(Debug, Clone, Default)]
pub struct ChecksumCache {
    entries: HashMap<PathBuf, Checksum>,
    stats: CacheStats,
}

impl ChecksumCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the digest for `path`, counting the hit or miss.
    pub fn lookup(&mut self, path: &Path) -> Option<Checksum> {
        let found = self.entries.get(path).copied();
        if found.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        found
    }

    /// Peek at the digest for `path` without touching the counters.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Checksum> {
        self.entries.get(path).copied()
    }

    /// Record `digest` as the current content of `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, digest: Checksum) {
        self.entries.insert(path.into(), digest);
    }

    /// Forget the digest for `path`, if any.
    pub fn invalidate(&mut self, path: &Path) -> Option<Checksum> {
        self.entries.remove(path)
    }

    /// Number of cached digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_counts_hits_and_misses() {
        let mut cache = ChecksumCache::new();
        let digest = Checksum::from_bytes([1u8; 16]);
        cache.insert("/data/a.txt", digest);

        assert_eq!(cache.lookup(Path::new("/data/a.txt")), Some(digest));
        assert_eq!(cache.lookup(Path::new("/data/b.txt")), None);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_get_does_not_count() {
        let mut cache = ChecksumCache::new();
        cache.insert("/x", Checksum::empty());
        assert!(cache.get(Path::new("/x")).is_some());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_insert_overwrites_and_invalidate_removes() {
        let mut cache = ChecksumCache::new();
        cache.insert("/x", Checksum::from_bytes([1u8; 16]));
        cache.insert("/x", Checksum::from_bytes([2u8; 16]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(Path::new("/x")), Some(Checksum::from_bytes([2u8; 16])));

        assert!(cache.invalidate(Path::new("/x")).is_some());
        assert!(cache.is_empty());
    }
}
