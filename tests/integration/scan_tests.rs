use dedupstore::scanner::{ScanError, ScanOptions, Scanner};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn names(options: ScanOptions, root: PathBuf) -> Vec<String> {
    Scanner::new(options)
        .unwrap()
        .scan_directories(vec![root])
        .filter_map(Result::ok)
        .map(|r| r.rel_path.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_scan_nested_tree_in_name_order() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("b/inner")).unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("b/inner/deep.txt"), "1").unwrap();
    fs::write(dir.path().join("a/top.txt"), "2").unwrap();
    fs::write(dir.path().join("root.txt"), "3").unwrap();

    let found = names(ScanOptions::default(), dir.path().to_path_buf());
    assert_eq!(found, vec!["a/top.txt", "b/inner/deep.txt", "root.txt"]);
}

#[test]
fn test_exclude_dir_prunes_subtree() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("cache/nested")).unwrap();
    fs::create_dir_all(dir.path().join("keep")).unwrap();
    fs::write(dir.path().join("cache/nested/x"), "x").unwrap();
    fs::write(dir.path().join("keep/y"), "y").unwrap();

    let options = ScanOptions {
        exclude_dir_patterns: vec!["^cache$".to_string()],
        ..Default::default()
    };
    assert_eq!(names(options, dir.path().to_path_buf()), vec!["keep/y"]);
}

#[test]
fn test_include_file_pattern() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.jpg"), "a").unwrap();
    fs::write(dir.path().join("b.png"), "b").unwrap();
    fs::write(dir.path().join("c.JPG"), "c").unwrap();

    let options = ScanOptions {
        include_file_patterns: vec!["(?i)\\.jpg$".to_string()],
        ..Default::default()
    };
    assert_eq!(names(options, dir.path().to_path_buf()), vec!["a.jpg", "c.JPG"]);
}

#[test]
fn test_missing_root_yields_error_and_continues() {
    let dir = tempdir().unwrap();
    let real = dir.path().join("real");
    fs::create_dir(&real).unwrap();
    fs::write(real.join("f"), "f").unwrap();

    let results: Vec<_> = Scanner::new(ScanOptions::default())
        .unwrap()
        .scan_directories(vec![dir.path().join("ghost"), real])
        .collect();

    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], Err(ScanError::NotFound(_))));
    assert!(results[1].is_ok());
}
