//! End-to-end CLI tests: invoke the built binary against real temp
//! directories and check exit codes, catalog contents, and destination
//! layout, rather than calling library functions directly.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn crate8() -> Command {
	Command::cargo_bin("crate8").unwrap()
}

#[test]
fn help_text_mentions_the_archiver() {
	crate8()
		.arg("--help")
		.assert()
		.success()
		.stdout(predicate::str::contains("content-addressed media archiver"));
}

#[test]
fn version_flag_succeeds() {
	crate8().arg("--version").assert().success();
}

#[test]
fn rejects_a_nonexistent_originals_path() {
	let cache = tempdir().unwrap();
	crate8()
		.args(["--cache", cache.path().to_str().unwrap(), "/no/such/directory/at/all"])
		.assert()
		.failure()
		.code(1);
}

#[test]
fn indexes_a_single_image_without_a_backup_root() {
	let originals = tempdir().unwrap();
	let cache = tempdir().unwrap();
	fs::write(originals.path().join("a.jpg"), [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();

	crate8()
		.args(["--cache", cache.path().to_str().unwrap(), originals.path().to_str().unwrap()])
		.assert()
		.success();

	assert!(cache.path().join("catalog.db").is_file());
}

#[test]
fn backs_up_a_single_image_under_its_content_addressed_destination() {
	let originals = tempdir().unwrap();
	let backup = tempdir().unwrap();
	fs::write(originals.path().join("a.jpg"), [0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3, 4]).unwrap();

	crate8()
		.args([
			"--backup",
			backup.path().to_str().unwrap(),
			originals.path().to_str().unwrap(),
		])
		.assert()
		.success();

	let image_root = backup.path().join("image");
	assert!(image_root.is_dir(), "expected an image/ tree under the backup root");

	let copied = walk_files(&image_root);
	assert_eq!(copied.len(), 1, "expected exactly one backed-up file, found {copied:?}");
}

#[test]
fn rerunning_the_same_originals_is_idempotent() {
	let originals = tempdir().unwrap();
	let backup = tempdir().unwrap();
	fs::write(originals.path().join("a.jpg"), [0xFF, 0xD8, 0xFF, 0xE0, 9, 9, 9]).unwrap();

	for _ in 0..2 {
		crate8()
			.args([
				"--backup",
				backup.path().to_str().unwrap(),
				originals.path().to_str().unwrap(),
			])
			.assert()
			.success();
	}

	let copied = walk_files(&backup.path().join("image"));
	assert_eq!(copied.len(), 1, "second run should not have duplicated the backed-up file");
}

#[test]
fn cleanup_flag_is_accepted_as_a_reserved_no_op() {
	let originals = tempdir().unwrap();
	let cache = tempdir().unwrap();
	fs::write(originals.path().join("a.jpg"), [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();

	crate8()
		.args([
			"--cleanup",
			"--cache",
			cache.path().to_str().unwrap(),
			originals.path().to_str().unwrap(),
		])
		.assert()
		.success();
}

fn walk_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
	let mut out = Vec::new();
	let mut stack = vec![root.to_path_buf()];
	while let Some(dir) = stack.pop() {
		let Ok(entries) = fs::read_dir(&dir) else { continue };
		for entry in entries.flatten() {
			let path = entry.path();
			if path.is_dir() {
				stack.push(path);
			} else {
				out.push(path);
			}
		}
	}
	out
}
