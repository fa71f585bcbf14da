#![cfg(unix)]

use dedupstore::store::{
    copy_batch, dir_to_descriptors, files_to_descriptors, CopyDescriptor, CopyOutcome, StoreConfig,
    StoreError,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn stored_names(data: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(data)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_identical_content_stored_once() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("src");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("x.txt"), "same").unwrap();
    fs::write(src.join("y.txt"), "same").unwrap();
    let dest = dir.path().join("dest");
    let data = dir.path().join("data");

    let descriptors = files_to_descriptors(
        &[src.join("x.txt"), src.join("y.txt")],
        Path::new(""),
        false,
    );
    let report = copy_batch(&descriptors, &dest, &data, &StoreConfig::default()).unwrap();

    assert_eq!(stored_names(&data), vec!["x.v0001.txt"]);
    for name in ["x.txt", "y.txt"] {
        let link = dest.join(name);
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::canonicalize(&link).unwrap(), fs::canonicalize(data.join("x.v0001.txt")).unwrap());
    }
    assert_eq!(report.copied(), 1);
    assert_eq!(report.reused(), 1);
    assert_eq!(report.resolved[&src.join("y.txt")], data.join("x.v0001.txt"));
}

#[test]
fn test_destination_inside_data_is_rejected() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("a.txt");
    fs::write(&source, "a").unwrap();
    let data = dir.path().join("data");

    let err = copy_batch(
        &[CopyDescriptor::new(&source, "a.txt", false)],
        &data.join("sub"),
        &data,
        &StoreConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err.error, StoreError::DestinationInsideData { .. }));
    assert!(err.is_validation());
    assert!(!data.exists());
}

#[test]
fn test_missing_source_rejects_whole_batch() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.txt");
    fs::write(&good, "g").unwrap();
    let dest = dir.path().join("dest");
    let data = dir.path().join("data");

    let descriptors = vec![
        CopyDescriptor::new(&good, "good.txt", false),
        CopyDescriptor::new(dir.path().join("missing.txt"), "missing.txt", false),
    ];
    let err = copy_batch(&descriptors, &dest, &data, &StoreConfig::default()).unwrap_err();

    assert!(matches!(err.error, StoreError::SourceNotFound(_)));
    assert!(!dest.exists());
    assert!(!data.exists());
}

#[test]
fn test_link_in_place_leaves_data_untouched() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    fs::create_dir(&a).unwrap();
    fs::write(a.join("b.txt"), "content").unwrap();
    let dest = dir.path().join("d");
    let data = dir.path().join("data");

    let report = copy_batch(
        &[CopyDescriptor::new(a.join("b.txt"), "b.txt", true)],
        &dest,
        &data,
        &StoreConfig::default(),
    )
    .unwrap();

    assert!(stored_names(&data).is_empty());
    assert_eq!(fs::read_link(dest.join("b.txt")).unwrap(), a.join("b.txt"));
    assert_eq!(report.entries[0].outcome, CopyOutcome::LinkedInPlace);
}

#[test]
fn test_second_batch_reuses_stored_bytes() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("photo.jpg");
    fs::write(&src, "jpeg bytes").unwrap();
    let dest = dir.path().join("view");
    let data = dir.path().join("data");

    copy_batch(
        &[CopyDescriptor::new(&src, "2023/photo.jpg", false)],
        &dest,
        &data,
        &StoreConfig::default(),
    )
    .unwrap();
    let report = copy_batch(
        &[CopyDescriptor::new(&src, "2024/renamed.jpg", false)],
        &dest,
        &data,
        &StoreConfig::default(),
    )
    .unwrap();

    assert_eq!(report.entries[0].outcome, CopyOutcome::Reused);
    assert_eq!(stored_names(&data), vec!["photo.v0001.jpg"]);
    assert_eq!(
        fs::read_link(dest.join("2024/renamed.jpg")).unwrap(),
        PathBuf::from("../../data/photo.v0001.jpg")
    );
}

#[test]
fn test_same_name_different_content_gets_new_version() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("one/notes.txt");
    let second = dir.path().join("two/notes.txt");
    fs::create_dir_all(first.parent().unwrap()).unwrap();
    fs::create_dir_all(second.parent().unwrap()).unwrap();
    fs::write(&first, "first draft").unwrap();
    fs::write(&second, "second draft").unwrap();
    let dest = dir.path().join("dest");
    let data = dir.path().join("data");

    let descriptors = vec![
        CopyDescriptor::new(&first, "old/notes.txt", false),
        CopyDescriptor::new(&second, "new/notes.txt", false),
    ];
    copy_batch(&descriptors, &dest, &data, &StoreConfig::default().with_verify(true)).unwrap();

    assert_eq!(stored_names(&data), vec!["notes.v0001.txt", "notes.v0002.txt"]);
    assert_eq!(fs::read_to_string(dest.join("new/notes.txt")).unwrap(), "second draft");
}

#[test]
fn test_directory_descriptors_mirror_tree() {
    let dir = tempdir().unwrap();
    let album = dir.path().join("album");
    fs::create_dir_all(album.join("cd1")).unwrap();
    fs::create_dir_all(album.join("cd2")).unwrap();
    fs::write(album.join("cd1/01.flac"), "track").unwrap();
    fs::write(album.join("cd2/01.flac"), "track").unwrap();
    fs::write(album.join("cover.png"), "art").unwrap();
    let dest = dir.path().join("dest");
    let data = dir.path().join("data");

    let descriptors = dir_to_descriptors(&album, false).unwrap();
    let report = copy_batch(&descriptors, &dest, &data, &StoreConfig::default()).unwrap();

    assert_eq!(report.entries.len(), 3);
    assert_eq!(stored_names(&data), vec!["01.v0001.flac", "cover.v0001.png"]);
    assert_eq!(fs::read_to_string(dest.join("cd2/01.flac")).unwrap(), "track");
}

#[test]
fn test_absolute_relative_dir_stays_in_dest_tree() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("a.txt");
    fs::write(&source, "a").unwrap();
    let dest = dir.path().join("dest");
    let data = dir.path().join("data");

    let descriptors = files_to_descriptors(&[source.clone()], &data.join("sub"), false);
    let report = copy_batch(&descriptors, &dest, &data, &StoreConfig::default()).unwrap();

    let link = &report.entries[0].destination;
    assert!(link.starts_with(&dest));
    assert!(fs::symlink_metadata(link).unwrap().file_type().is_symlink());
    assert!(!data.join("sub").exists());
    assert_eq!(stored_names(&data), vec!["a.v0001.txt"]);
}

#[test]
fn test_link_into_nested_data_root_is_rejected() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("a.txt");
    fs::write(&source, "a").unwrap();
    let dest = dir.path().join("library");
    let data = dest.join("store");

    let err = copy_batch(
        &[CopyDescriptor::new(&source, "store/a.txt", false)],
        &dest,
        &data,
        &StoreConfig::default(),
    )
    .unwrap_err();

    assert!(err.is_validation());
    assert!(matches!(err.error, StoreError::DestinationInsideData { .. }));
    assert!(!dest.exists());
}
