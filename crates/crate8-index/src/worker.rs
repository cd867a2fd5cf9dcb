//! Per-file index work: stat, hash, sniff, extract metadata, decide whether the
//! result is even worth emitting. Every failure here is recoverable — logged
//! and skipped; nothing in this module is allowed to abort the run.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate8_catalog::{BornSource, IndexedFile};
use crate8_fingerprint::{exif, fingerprint_file, related_siblings, sniff, best_filename_time, ExifTool};
use tracing::{debug, warn};

use crate::config::IndexConfig;

/// Runs the full per-file pipeline. Returns `None` when the file should not be
/// (re)emitted at all: stat failure, over the size ceiling, or unchanged since
/// the last run's snapshot. Otherwise returns the new row plus the prior row
/// for the same path, if one existed (so the writer can fold it into the audit
/// trail on replacement).
pub fn index_one(
	path: &Path,
	config: &IndexConfig,
	tool: &ExifTool,
	snapshot: &HashMap<String, IndexedFile>,
) -> Option<(IndexedFile, Option<IndexedFile>)> {
	let path_str = path.to_string_lossy().into_owned();

	let meta = match fs::metadata(path) {
		Ok(meta) => meta,
		Err(error) => {
			warn!(path = %path_str, %error, "stat failed, skipping");
			return None;
		}
	};

	if !meta.is_file() {
		return None;
	}

	let size = meta.len();
	if size == 0 {
		debug!(path = %path_str, "zero-byte file, skipping");
		return None;
	}
	if size > config.max_file_size {
		warn!(path = %path_str, size, limit = config.max_file_size, "file exceeds size ceiling, skipping");
		return None;
	}

	let modified_at = meta
		.modified()
		.ok()
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0);

	let prior = snapshot.get(&path_str).cloned();
	if !config.force {
		if let Some(prior) = &prior {
			if prior.size == size && prior.modified_at == modified_at {
				debug!(path = %path_str, "unchanged since last index, skipping");
				return None;
			}
		}
	}

	let (mut born_at, mut born_source) = match best_filename_time(path) {
		Some(dt) => (dt.timestamp(), BornSource::Name),
		None => (modified_at, BornSource::Stat),
	};

	let output = match fingerprint_file(path) {
		Ok(output) => output,
		Err(error) => {
			warn!(path = %path_str, %error, "fingerprinting failed, skipping");
			return None;
		}
	};

	let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	let (class, subtype) = sniff(&output.head, &file_name);

	match exif::extract(tool, path, output.fingerprint, &config.cache_root, &config.default_timezone) {
		Ok(result) => {
			if let Some(capture) = result.capture_time {
				born_at = capture.utc.timestamp();
				born_source = BornSource::Meta;
			}
		}
		Err(error) => {
			warn!(path = %path_str, %error, "metadata extraction failed, continuing without it");
		}
	}

	let related = related_siblings(path);
	let info = (!related.is_empty()).then(|| {
		let names: Vec<String> = related.iter().map(|p| p.to_string_lossy().into_owned()).collect();
		serde_json::json!({ "related": names }).to_string()
	});

	let file = IndexedFile {
		path: path_str,
		host: config.host.clone(),
		fingerprint: output.fingerprint,
		size,
		modified_at,
		born_at,
		born_source,
		mime_type: class.as_str().to_string(),
		mime_subtype: subtype,
		info,
	};

	Some((file, prior))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn config(cache_root: std::path::PathBuf) -> IndexConfig {
		IndexConfig {
			host: "testhost".to_string(),
			workers: 1,
			force: false,
			max_file_size: IndexConfig::DEFAULT_MAX_FILE_SIZE,
			cache_root,
			exiftool_bin: "exiftool-definitely-not-on-path".to_string(),
			default_timezone: "UTC".parse().unwrap(),
			ignore_file_name: ".bpignore".to_string(),
		}
	}

	#[test]
	fn indexes_a_new_file_with_stat_fallback_time() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a.jpg");
		std::fs::File::create(&path).unwrap().write_all(&[0xFF, 0xD8, 0xFF]).unwrap();

		let tool = ExifTool::discover("exiftool-definitely-not-on-path");
		let cfg = config(dir.path().join("cache"));
		let (file, prior) = index_one(&path, &cfg, &tool, &HashMap::new()).unwrap();

		assert!(prior.is_none());
		assert_eq!(file.mime_type, "image");
		assert_eq!(file.mime_subtype, "jpeg");
		assert_eq!(file.born_source, BornSource::Stat);
	}

	#[test]
	fn skips_zero_byte_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("empty.jpg");
		std::fs::File::create(&path).unwrap();

		let tool = ExifTool::discover("exiftool-definitely-not-on-path");
		let cfg = config(dir.path().join("cache"));

		assert!(index_one(&path, &cfg, &tool, &HashMap::new()).is_none());
	}

	#[test]
	fn skips_unchanged_file_against_snapshot() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a.jpg");
		std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();

		let tool = ExifTool::discover("exiftool-definitely-not-on-path");
		let cfg = config(dir.path().join("cache"));
		let (first, _) = index_one(&path, &cfg, &tool, &HashMap::new()).unwrap();

		let mut snapshot = HashMap::new();
		snapshot.insert(first.path.clone(), first);

		assert!(index_one(&path, &cfg, &tool, &snapshot).is_none());
	}

	#[test]
	fn force_reindexes_unchanged_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a.jpg");
		std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();

		let tool = ExifTool::discover("exiftool-definitely-not-on-path");
		let mut cfg = config(dir.path().join("cache"));
		let (first, _) = index_one(&path, &cfg, &tool, &HashMap::new()).unwrap();

		let mut snapshot = HashMap::new();
		snapshot.insert(first.path.clone(), first);
		cfg.force = true;

		assert!(index_one(&path, &cfg, &tool, &snapshot).is_some());
	}

	#[test]
	fn records_related_sidecar_in_info() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("IMG_0001.jpg");
		std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();
		std::fs::File::create(dir.path().join("IMG_0001.AAE")).unwrap();

		let tool = ExifTool::discover("exiftool-definitely-not-on-path");
		let cfg = config(dir.path().join("cache"));
		let (file, _) = index_one(&path, &cfg, &tool, &HashMap::new()).unwrap();

		let info = file.info.expect("expected related-sidecar info");
		assert!(info.contains("IMG_0001.AAE"));
	}
}
