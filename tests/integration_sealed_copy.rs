//! Sealed-copy scenarios (SPEC §8): equivalence and rollback.

use std::fs;
use std::path::Path;

use assert_cmd::Command;

fn godi() -> Command {
    Command::cargo_bin("godi").unwrap()
}

fn index_path(root: &Path) -> std::path::PathBuf {
    fs::read_dir(root)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|e| e == "gobz"))
        .expect("index file present")
}

#[test]
fn sealed_copy_produces_matching_files_and_indices_at_both_ends() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a.bin"), vec![0u8; 1000]).unwrap();
    fs::write(src.path().join("b.bin"), vec![0xffu8; 1000]).unwrap();
    fs::create_dir(src.path().join("empty")).unwrap();

    godi()
        .arg("sealed-copy")
        .arg(src.path())
        .arg("--")
        .arg(dst.path())
        .assert()
        .success();

    assert_eq!(
        fs::read(dst.path().join("a.bin")).unwrap(),
        vec![0u8; 1000]
    );
    assert_eq!(
        fs::read(dst.path().join("b.bin")).unwrap(),
        vec![0xffu8; 1000]
    );
    assert!(dst.path().join("empty").is_dir());

    // Both the source and the destination get an index.
    let _ = index_path(src.path());
    let _ = index_path(dst.path());
}

#[test]
fn preexisting_destination_file_blocks_only_that_file_and_rolls_back_the_rest() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a.bin"), b"aaaa").unwrap();
    fs::write(src.path().join("b.bin"), b"bbbb").unwrap();
    fs::write(dst.path().join("b.bin"), b"existing").unwrap();

    let output = godi()
        .arg("sealed-copy")
        .arg(src.path())
        .arg("--")
        .arg(dst.path())
        .output()
        .unwrap();
    assert!(!output.status.success());

    assert!(!dst.path().join("a.bin").exists());
    assert_eq!(fs::read(dst.path().join("b.bin")).unwrap(), b"existing");

    let gobz_count = fs::read_dir(dst.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|e| e == "gobz"))
        .count();
    assert_eq!(gobz_count, 0, "failed destination root must not get an index");
}
