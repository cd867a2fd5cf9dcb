//! Related-file discovery: non-primary files that travel alongside a media
//! file under the same stem (an edit sidecar, an `.xmp` next to a raw photo).
//!
//! A slice rather than a single hardcoded extension, so new sidecar kinds are
//! a one-line addition rather than a new code path.
use std::fs;
use std::path::{Path, PathBuf};

pub const RELATED_SIDECAR_EXTENSIONS: &[&str] = &["AAE"];

/// Siblings of `path` in the same directory sharing its file stem and whose
/// extension (case-insensitively) is in [`RELATED_SIDECAR_EXTENSIONS`].
pub fn related_siblings(path: &Path) -> Vec<PathBuf> {
	let (Some(dir), Some(stem)) = (path.parent(), path.file_stem()) else {
		return Vec::new();
	};

	let Ok(entries) = fs::read_dir(dir) else {
		return Vec::new();
	};

	let mut found = Vec::new();
	for entry in entries.flatten() {
		let candidate = entry.path();
		if candidate == path {
			continue;
		}
		if candidate.file_stem() != Some(stem) {
			continue;
		}
		let Some(ext) = candidate.extension().and_then(|e| e.to_str()) else {
			continue;
		};
		if RELATED_SIDECAR_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)) {
			found.push(candidate);
		}
	}
	found.sort();
	found
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::File;

	#[test]
	fn finds_same_stem_sidecar() {
		let dir = tempfile::tempdir().unwrap();
		File::create(dir.path().join("IMG_0001.jpg")).unwrap();
		File::create(dir.path().join("IMG_0001.AAE")).unwrap();
		File::create(dir.path().join("IMG_0002.jpg")).unwrap();

		let siblings = related_siblings(&dir.path().join("IMG_0001.jpg"));
		assert_eq!(siblings, vec![dir.path().join("IMG_0001.AAE")]);
	}

	#[test]
	fn none_when_no_sidecar_present() {
		let dir = tempfile::tempdir().unwrap();
		File::create(dir.path().join("IMG_0002.jpg")).unwrap();
		assert!(related_siblings(&dir.path().join("IMG_0002.jpg")).is_empty());
	}
}
