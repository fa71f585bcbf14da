use dedupstore::session::{CompareOptions, ComparisonSession, SessionConfig, Verdict};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn session() -> ComparisonSession {
    ComparisonSession::new(SessionConfig::default()).unwrap()
}

fn scan(session: &mut ComparisonSession, canonical: &Path, query: &Path) {
    session.scan_canonical(vec![canonical.to_path_buf()]).finish();
    session.scan_query(vec![query.to_path_buf()]).finish();
}

#[test]
fn test_duplicate_and_unique_classification() {
    let dir = tempdir().unwrap();
    let canonical = dir.path().join("canonical");
    let query = dir.path().join("query");
    fs::create_dir_all(&canonical).unwrap();
    fs::create_dir_all(&query).unwrap();
    fs::write(canonical.join("a.txt"), "hello").unwrap();
    fs::write(query.join("b.txt"), "hello").unwrap();
    fs::write(query.join("c.txt"), "world").unwrap();

    let mut session = session();
    scan(&mut session, &canonical, &query);
    session.compare(CompareOptions::default()).finish();

    let result = session.classification();
    assert_eq!(result.verdict(&query.join("b.txt")), Some(Verdict::Duplicate));
    assert_eq!(result.first_match(&query.join("b.txt")), Some(canonical.join("a.txt").as_path()));
    assert_eq!(result.verdict(&query.join("c.txt")), Some(Verdict::Unique));
    assert!(!result.has_errors());
}

#[test]
fn test_matches_across_multiple_canonical_roots_are_sorted() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("c1");
    let second = dir.path().join("c2");
    let query = dir.path().join("q");
    for d in [&first, &second, &query] {
        fs::create_dir_all(d).unwrap();
    }
    fs::write(second.join("z.bin"), "same bytes").unwrap();
    fs::write(first.join("y.bin"), "same bytes").unwrap();
    fs::write(query.join("x.bin"), "same bytes").unwrap();

    let mut session = session();
    session
        .scan_canonical(vec![second.clone(), first.clone()])
        .finish();
    session.scan_query(vec![query.clone()]).finish();
    session.compare(CompareOptions::default()).finish();

    let matches = &session.classification().duplicates[&query.join("x.bin")];
    assert_eq!(matches, &vec![first.join("y.bin"), second.join("z.bin")]);
}

#[test]
fn test_rel_path_filter_uses_scan_roots() {
    let dir = tempdir().unwrap();
    let canonical = dir.path().join("library");
    let query = dir.path().join("incoming");
    fs::create_dir_all(canonical.join("2024")).unwrap();
    fs::create_dir_all(query.join("2024")).unwrap();
    fs::create_dir_all(query.join("2023")).unwrap();
    fs::write(canonical.join("2024/pic.jpg"), "pixels").unwrap();
    fs::write(query.join("2024/pic.jpg"), "pixels").unwrap();
    fs::write(query.join("2023/pic.jpg"), "pixels").unwrap();

    // Query items that are directories get their own rel_path root.
    let mut session = session();
    session.scan_canonical(vec![canonical.clone()]).finish();
    session.scan_query(vec![query.clone()]).finish();
    session
        .compare(CompareOptions::default().with_rel_path(true))
        .finish();

    let result = session.classification();
    assert_eq!(result.verdict(&query.join("2024/pic.jpg")), Some(Verdict::Duplicate));
    assert_eq!(result.verdict(&query.join("2023/pic.jpg")), Some(Verdict::Unique));
}

#[test]
fn test_mtime_filter() {
    let dir = tempdir().unwrap();
    let canonical = dir.path().join("c");
    let query = dir.path().join("q");
    fs::create_dir_all(&canonical).unwrap();
    fs::create_dir_all(&query).unwrap();
    let stamp = filetime::FileTime::from_unix_time(1_600_000_000, 0);
    let other = filetime::FileTime::from_unix_time(1_500_000_000, 0);

    fs::write(canonical.join("a"), "data").unwrap();
    fs::write(query.join("same_time"), "data").unwrap();
    fs::write(query.join("other_time"), "data").unwrap();
    filetime::set_file_mtime(canonical.join("a"), stamp).unwrap();
    filetime::set_file_mtime(query.join("same_time"), stamp).unwrap();
    filetime::set_file_mtime(query.join("other_time"), other).unwrap();

    let mut session = session();
    scan(&mut session, &canonical, &query);
    session
        .compare(CompareOptions::default().with_mtime(true))
        .finish();

    let result = session.classification();
    assert_eq!(result.verdict(&query.join("same_time")), Some(Verdict::Duplicate));
    assert_eq!(result.verdict(&query.join("other_time")), Some(Verdict::Unique));
}

#[test]
fn test_same_size_different_content_is_unique() {
    let dir = tempdir().unwrap();
    let canonical = dir.path().join("c");
    let query = dir.path().join("q");
    fs::create_dir_all(&canonical).unwrap();
    fs::create_dir_all(&query).unwrap();
    fs::write(canonical.join("a"), vec![b'a'; 100_000]).unwrap();
    let mut changed = vec![b'a'; 100_000];
    changed[99_999] = b'b';
    fs::write(query.join("a"), changed).unwrap();

    let mut session = session();
    scan(&mut session, &canonical, &query);
    session.compare(CompareOptions::default()).finish();

    let result = session.classification();
    assert_eq!(result.verdict(&query.join("a")), Some(Verdict::Unique));
    assert_eq!(result.stats.comparisons, 1);
}

#[test]
fn test_query_can_mix_files_and_directories() {
    let dir = tempdir().unwrap();
    let canonical = dir.path().join("c");
    let query_dir = dir.path().join("q");
    fs::create_dir_all(&canonical).unwrap();
    fs::create_dir_all(&query_dir).unwrap();
    fs::write(canonical.join("known"), "known").unwrap();
    fs::write(query_dir.join("inside"), "known").unwrap();
    let loose: PathBuf = dir.path().join("loose");
    fs::write(&loose, "fresh").unwrap();

    let mut session = session();
    session.scan_canonical(vec![canonical]).finish();
    let scanned = session.scan_query(vec![query_dir.clone(), loose.clone()]).finish();
    assert_eq!(scanned, 2);
    session.compare(CompareOptions::default()).finish();

    let result = session.classification();
    assert_eq!(result.verdict(&query_dir.join("inside")), Some(Verdict::Duplicate));
    assert_eq!(result.verdict(&loose), Some(Verdict::Unique));
}
