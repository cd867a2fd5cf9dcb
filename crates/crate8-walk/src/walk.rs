//! Directory traversal: emits candidate regular-file paths onto a bounded
//! channel, skipping whatever a `.bpignore` file marks as ignored and guarding
//! against symlink cycles explicitly (walkdir's own `follow_links` does not
//! dedupe revisited directories).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use walkdir::WalkDir;

use crate::error::WalkError;

/// Name of the per-directory ignore file; one glob pattern per line, same
/// shape as `.gitignore`, applying wholesale to matching directory entries.
pub const DEFAULT_IGNORE_FILE_NAME: &str = ".bpignore";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
	pub emitted: u64,
	pub ignored_dirs: u64,
	pub ignored_files: u64,
	pub walk_errors: u64,
}

/// Walks `root`, sending every non-ignored regular file to `tx`. `tx` being a
/// bounded channel provides back-pressure: this function blocks on `send`
/// when the consumer side is behind.
///
/// `cancel` is checked between entries so the walk can be interrupted
/// cooperatively; walking stops (without error) the moment it's observed set.
pub fn walk(
	root: &Path,
	ignore_file_name: &str,
	tx: &Sender<PathBuf>,
	cancel: &AtomicBool,
) -> Result<WalkStats, WalkError> {
	let root = root
		.canonicalize()
		.map_err(|source| WalkError::Root { path: root.to_path_buf(), source })?;

	let mut visited_dirs: HashSet<PathBuf> = HashSet::new();
	visited_dirs.insert(root.clone());

	let mut layers: Vec<Gitignore> = Vec::new();
	let mut stats = WalkStats::default();

	let mut it = WalkDir::new(&root).follow_links(true).into_iter();
	while let Some(entry) = it.next() {
		if cancel.load(Ordering::Relaxed) {
			tracing::debug!("walk cancelled");
			break;
		}

		let entry = match entry {
			Ok(entry) => entry,
			Err(err) => {
				tracing::warn!(error = %err, "walk error, skipping entry");
				stats.walk_errors += 1;
				continue;
			}
		};

		let depth = entry.depth();
		layers.truncate(depth);

		if entry.file_type().is_dir() {
			if is_ignored(&layers, entry.path(), true) {
				stats.ignored_dirs += 1;
				it.skip_current_dir();
				continue;
			}

			if depth > 0 && entry.path_is_symlink() {
				match entry.path().canonicalize() {
					Ok(real) if !visited_dirs.insert(real) => {
						tracing::debug!(path = %entry.path().display(), "symlink cycle detected, skipping");
						it.skip_current_dir();
						continue;
					}
					Ok(_) => {}
					Err(source) => {
						tracing::warn!(path = %entry.path().display(), %source, "failed to canonicalize symlinked directory");
						it.skip_current_dir();
						continue;
					}
				}
			}

			layers.push(load_ignore(entry.path(), ignore_file_name));
			continue;
		}

		if !entry.file_type().is_file() {
			continue;
		}

		if is_ignored(&layers, entry.path(), false) {
			stats.ignored_files += 1;
			continue;
		}

		stats.emitted += 1;
		if tx.send(entry.path().to_path_buf()).is_err() {
			tracing::debug!("walk output channel closed, stopping early");
			break;
		}
	}

	Ok(stats)
}

fn load_ignore(dir: &Path, ignore_file_name: &str) -> Gitignore {
	let candidate = dir.join(ignore_file_name);
	if !candidate.is_file() {
		return Gitignore::empty();
	}

	let mut builder = GitignoreBuilder::new(dir);
	if let Some(err) = builder.add(&candidate) {
		tracing::warn!(path = %candidate.display(), error = %err, "failed to parse ignore file");
	}
	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

fn is_ignored(layers: &[Gitignore], path: &Path, is_dir: bool) -> bool {
	let mut ignored = false;
	for layer in layers {
		match layer.matched(path, is_dir) {
			Match::None => {}
			Match::Ignore(_) => ignored = true,
			Match::Whitelist(_) => ignored = false,
		}
	}
	ignored
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	fn collect(root: &Path) -> (Vec<PathBuf>, WalkStats) {
		let (tx, rx) = crossbeam_channel::unbounded();
		let cancel = AtomicBool::new(false);
		let stats = walk(root, DEFAULT_IGNORE_FILE_NAME, &tx, &cancel).unwrap();
		drop(tx);
		(rx.iter().collect(), stats)
	}

	#[test]
	fn emits_regular_files_only() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.jpg"), b"x").unwrap();
		fs::create_dir(dir.path().join("sub")).unwrap();
		fs::write(dir.path().join("sub/b.jpg"), b"y").unwrap();

		let (mut paths, stats) = collect(dir.path());
		paths.sort();
		assert_eq!(paths.len(), 2);
		assert_eq!(stats.emitted, 2);
	}

	#[test]
	fn respects_ignore_file() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join(".bpignore"), b"*.tmp\nsecret/\n").unwrap();
		fs::write(dir.path().join("a.jpg"), b"x").unwrap();
		fs::write(dir.path().join("skip.tmp"), b"x").unwrap();
		fs::create_dir(dir.path().join("secret")).unwrap();
		fs::write(dir.path().join("secret/hidden.jpg"), b"x").unwrap();

		let (paths, stats) = collect(dir.path());
		assert_eq!(paths.len(), 1);
		assert!(paths[0].ends_with("a.jpg"));
		assert_eq!(stats.ignored_files, 1);
		assert_eq!(stats.ignored_dirs, 1);
	}

	#[test]
	fn nested_ignore_file_scopes_to_its_subtree() {
		let dir = tempfile::tempdir().unwrap();
		fs::create_dir(dir.path().join("sub")).unwrap();
		fs::write(dir.path().join("sub/.bpignore"), b"*.raw\n").unwrap();
		fs::write(dir.path().join("a.raw"), b"x").unwrap();
		fs::write(dir.path().join("sub/b.raw"), b"x").unwrap();

		let (mut paths, _) = collect(dir.path());
		paths.sort();
		assert_eq!(paths.len(), 1);
		assert!(paths[0].ends_with("a.raw"));
	}

	#[test]
	fn cancellation_stops_the_walk_early() {
		let dir = tempfile::tempdir().unwrap();
		for i in 0..20 {
			fs::write(dir.path().join(format!("f{i}.jpg")), b"x").unwrap();
		}

		let (tx, rx) = crossbeam_channel::bounded(1);
		let cancel = AtomicBool::new(true);
		let stats = walk(dir.path(), DEFAULT_IGNORE_FILE_NAME, &tx, &cancel).unwrap();
		drop(tx);
		let seen: Vec<_> = rx.iter().collect();
		assert!(seen.len() <= 1);
		assert_eq!(stats.emitted, seen.len() as u64);
	}
}
