//! Inverted attribute index over scanned files.
//!
//! # Overview
//!
//! An [`AttributeIndex`] keeps seven sub-indices, one per cheap attribute of a
//! [`FileRecord`]: size, name, type (extension), parent directory name,
//! relative path, ctime and mtime. Each maps an attribute value to the set of
//! absolute paths carrying it. Candidate lookup starts from the size bucket and
//! intersects the buckets of every other attribute the caller selects, so
//! content comparison is only attempted between files that already agree on
//! everything cheap.
//!
//! Path sets are ordered, so the "first" candidate is always the
//! lexicographically smallest path, independent of insertion order and
//! platform.
//!
//! # Example
//!
//! ```no_run
//! use dedupstore::index::{AttributeIndex, CandidateQuery};
//! use dedupstore::scanner::FileRecord;
//! use std::path::Path;
//!
//! let mut index = AttributeIndex::new();
//! let record = FileRecord::from_path(Path::new("/data/a.txt"), Path::new("/data")).unwrap();
//! index.add(&record);
//!
//! let candidates = index.query(&CandidateQuery::by_size(record.size).with_name("a.txt"));
//! assert_eq!(candidates.len(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::scanner::FileRecord;

/// Attribute value → ordered set of paths.
type SubIndex<K> = HashMap<K, BTreeSet<PathBuf>>;

/// Candidate lookup over a set of [`FileRecord`]s.
///
/// Entries are only ever added. Every indexed path appears exactly once in
/// each of the seven sub-indices.
#[derive(Debug, Clone, Default)]
pub struct AttributeIndex {
    records: BTreeMap<PathBuf, FileRecord>,
    size: SubIndex<u64>,
    name: SubIndex<String>,
    file_type: SubIndex<String>,
    parent: SubIndex<String>,
    rel_path: SubIndex<PathBuf>,
    ctime: SubIndex<SystemTime>,
    mtime: SubIndex<SystemTime>,
}

/// Attribute selection for [`AttributeIndex::query`].
///
/// `size` is mandatory; every other attribute is optional and only narrows the
/// result when present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateQuery {
    /// Exact size in bytes
    pub size: u64,
    /// File name
    pub name: Option<String>,
    /// Extension including the leading dot
    pub file_type: Option<String>,
    /// Parent directory name
    pub parent: Option<String>,
    /// Path relative to the scan root
    pub rel_path: Option<PathBuf>,
    /// Status change time
    pub ctime: Option<SystemTime>,
    /// Modification time
    pub mtime: Option<SystemTime>,
}

impl CandidateQuery {
    /// Query by size alone.
    #[must_use]
    pub fn by_size(size: u64) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Also require the file name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Also require the extension.
    #[must_use]
    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    /// Also require the parent directory name.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Also require the relative path.
    #[must_use]
    pub fn with_rel_path(mut self, rel_path: impl Into<PathBuf>) -> Self {
        self.rel_path = Some(rel_path.into());
        self
    }

    /// Also require the ctime.
    #[must_use]
    pub fn with_ctime(mut self, ctime: SystemTime) -> Self {
        self.ctime = Some(ctime);
        self
    }

    /// Also require the mtime.
    #[must_use]
    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

fn insert<K: Eq + Hash>(index: &mut SubIndex<K>, key: K, path: &Path) {
    index.entry(key).or_default().insert(path.to_path_buf());
}

impl AttributeIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a record under each of its seven attributes.
    ///
    /// Adding the same path again is a no-op.
    pub fn add(&mut self, record: &FileRecord) {
        if self.records.contains_key(&record.path) {
            log::trace!("Already indexed: {}", record.path.display());
            return;
        }
        let path = record.path.as_path();
        insert(&mut self.size, record.size, path);
        insert(&mut self.name, record.name.clone(), path);
        insert(&mut self.file_type, record.file_type.clone(), path);
        insert(&mut self.parent, record.parent.clone(), path);
        insert(&mut self.rel_path, record.rel_path.clone(), path);
        insert(&mut self.ctime, record.ctime, path);
        insert(&mut self.mtime, record.mtime, path);
        self.records.insert(record.path.clone(), record.clone());
    }

    /// Candidate paths matching every attribute in `query`.
    ///
    /// An attribute value absent from its sub-index makes the whole result
    /// empty. The returned set is ordered by path.
    #[must_use]
    pub fn query(&self, query: &CandidateQuery) -> BTreeSet<PathBuf> {
        let Some(by_size) = self.size.get(&query.size) else {
            return BTreeSet::new();
        };

        let mut selected: Vec<&BTreeSet<PathBuf>> = Vec::new();
        macro_rules! narrow {
            ($field:ident) => {
                if let Some(value) = &query.$field {
                    match self.$field.get(value) {
                        Some(paths) => selected.push(paths),
                        None => return BTreeSet::new(),
                    }
                }
            };
        }
        narrow!(name);
        narrow!(file_type);
        narrow!(parent);
        narrow!(rel_path);
        narrow!(ctime);
        narrow!(mtime);

        by_size
            .iter()
            .filter(|path| selected.iter().all(|set| set.contains(*path)))
            .cloned()
            .collect()
    }

    /// Look up the record stored for `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    /// Whether `path` has been indexed.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    /// Indexed records, ordered by path.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Number of indexed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total bytes across indexed files.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.records.values().map(|r| r.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(path: &str, size: u64, mtime_secs: u64) -> FileRecord {
        let path = PathBuf::from(path);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let file_type = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let parent = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rel_path = path.strip_prefix("/root").unwrap_or(&path).to_path_buf();
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs);
        FileRecord {
            path,
            size,
            name,
            file_type,
            parent,
            rel_path,
            ctime: time,
            mtime: time,
            is_dir: false,
            is_link: false,
            mode: 0o644,
            uid: 0,
            gid: 0,
        }
    }

    fn sample_index() -> AttributeIndex {
        let mut index = AttributeIndex::new();
        index.add(&record("/root/docs/a.txt", 100, 10));
        index.add(&record("/root/docs/b.txt", 100, 20));
        index.add(&record("/root/music/a.txt", 100, 10));
        index.add(&record("/root/music/c.mp3", 200, 10));
        index
    }

    fn paths(items: &[&str]) -> BTreeSet<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_query_by_size_only() {
        let index = sample_index();
        assert_eq!(
            index.query(&CandidateQuery::by_size(100)),
            paths(&["/root/docs/a.txt", "/root/docs/b.txt", "/root/music/a.txt"])
        );
        assert_eq!(
            index.query(&CandidateQuery::by_size(200)),
            paths(&["/root/music/c.mp3"])
        );
    }

    #[test]
    fn test_query_unknown_size_is_empty() {
        let index = sample_index();
        assert!(index.query(&CandidateQuery::by_size(999)).is_empty());
    }

    #[test]
    fn test_query_intersects_attributes() {
        let index = sample_index();
        let query = CandidateQuery::by_size(100).with_name("a.txt");
        assert_eq!(
            index.query(&query),
            paths(&["/root/docs/a.txt", "/root/music/a.txt"])
        );

        let query = query.with_parent("docs");
        assert_eq!(index.query(&query), paths(&["/root/docs/a.txt"]));

        let query = CandidateQuery::by_size(100)
            .with_mtime(SystemTime::UNIX_EPOCH + Duration::from_secs(10))
            .with_file_type(".txt");
        assert_eq!(
            index.query(&query),
            paths(&["/root/docs/a.txt", "/root/music/a.txt"])
        );
    }

    #[test]
    fn test_query_absent_attribute_short_circuits() {
        let index = sample_index();
        // Size and type would match, but the name was never indexed.
        let query = CandidateQuery::by_size(100)
            .with_file_type(".txt")
            .with_name("missing.txt");
        assert!(index.query(&query).is_empty());
    }

    #[test]
    fn test_query_disjoint_attributes_is_empty() {
        let index = sample_index();
        let query = CandidateQuery::by_size(100).with_file_type(".mp3");
        assert!(index.query(&query).is_empty());
    }

    #[test]
    fn test_query_rel_path() {
        let index = sample_index();
        let query = CandidateQuery::by_size(100).with_rel_path("music/a.txt");
        assert_eq!(index.query(&query), paths(&["/root/music/a.txt"]));
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut index = sample_index();
        index.add(&record("/root/docs/a.txt", 100, 10));
        assert_eq!(index.len(), 4);
        assert_eq!(index.query(&CandidateQuery::by_size(100)).len(), 3);
    }

    #[test]
    fn test_every_path_in_every_sub_index() {
        let index = sample_index();
        for r in index.records() {
            assert!(index.size[&r.size].contains(&r.path));
            assert!(index.name[&r.name].contains(&r.path));
            assert!(index.file_type[&r.file_type].contains(&r.path));
            assert!(index.parent[&r.parent].contains(&r.path));
            assert!(index.rel_path[&r.rel_path].contains(&r.path));
            assert!(index.ctime[&r.ctime].contains(&r.path));
            assert!(index.mtime[&r.mtime].contains(&r.path));
        }
    }

    #[test]
    fn test_first_candidate_is_smallest_path() {
        let mut index = AttributeIndex::new();
        index.add(&record("/root/z.txt", 5, 1));
        index.add(&record("/root/a.txt", 5, 1));
        let first = index.query(&CandidateQuery::by_size(5)).into_iter().next();
        assert_eq!(first, Some(PathBuf::from("/root/a.txt")));
    }

    #[test]
    fn test_accessors() {
        let index = sample_index();
        assert!(!index.is_empty());
        assert_eq!(index.total_size(), 500);
        assert!(index.contains(Path::new("/root/music/c.mp3")));
        assert_eq!(index.get(Path::new("/root/music/c.mp3")).unwrap().size, 200);
        assert!(index.get(Path::new("/root/none")).is_none());
    }
}
