use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while computing a file's content fingerprint.
#[derive(Debug, Error)]
pub enum FingerprintError {
	#[error("opening {path}: {source}")]
	Open {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("reading {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("{0:?} is not a 16-character hex fingerprint")]
	BadHex(String),
}

/// Errors raised while extracting EXIF/container metadata.
#[derive(Debug, Error)]
pub enum ExifError {
	#[error("invoking exiftool on {path}: {source}")]
	Spawn {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("parsing exiftool output for {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("reading metadata cache {path}: {source}")]
	CacheRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}
