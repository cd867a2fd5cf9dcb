//! Streaming content fingerprinting via XXH3-64.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use xxhash_rust::xxh3::Xxh3;

use crate::error::FingerprintError;

/// Number of header bytes retained for format sniffing.
pub const SNIFF_HEAD_BYTES: usize = 8 * 1024;

const READ_BUF_SIZE: usize = 64 * 1024;

/// A 64-bit XXH3 content fingerprint: the identity of "these are the same bytes".
///
/// Canonical textual form is 16 lowercase hex characters, which is also how it's
/// stored in the `files.fingerprint` catalog column (via [`ToSql`]/[`FromSql`], as
/// a bit-reinterpreted signed 64-bit integer, since SQLite has no unsigned type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
	pub fn to_hex(self) -> String {
		format!("{:016x}", self.0)
	}

	pub fn from_hex(s: &str) -> Option<Self> {
		if s.len() != 16 {
			return None;
		}
		u64::from_str_radix(s, 16).ok().map(Fingerprint)
	}
}

impl fmt::Display for Fingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl FromStr for Fingerprint {
	type Err = FingerprintError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_hex(s).ok_or_else(|| FingerprintError::BadHex(s.to_string()))
	}
}

impl ToSql for Fingerprint {
	fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
		Ok(ToSqlOutput::from(self.0 as i64))
	}
}

impl FromSql for Fingerprint {
	fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
		value.as_i64().map(|v| Fingerprint(v as u64))
	}
}

/// Result of fingerprinting one file: its hash, size, and retained header bytes.
#[derive(Debug, Clone)]
pub struct FingerprintOutput {
	pub fingerprint: Fingerprint,
	pub size: u64,
	/// First [`SNIFF_HEAD_BYTES`] of the file (or the whole file if smaller), for
	/// callers that need to sniff its type without a second read.
	pub head: Vec<u8>,
}

/// Streams a file's full content through XXH3-64 exactly once, retaining the first
/// [`SNIFF_HEAD_BYTES`] bytes along the way for format sniffing.
#[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn fingerprint_file(path: &Path) -> Result<FingerprintOutput, FingerprintError> {
	let mut file = File::open(path).map_err(|source| FingerprintError::Open {
		path: path.to_path_buf(),
		source,
	})?;

	let mut hasher = Xxh3::new();
	let mut head = Vec::with_capacity(SNIFF_HEAD_BYTES);
	let mut buf = [0u8; READ_BUF_SIZE];
	let mut size = 0u64;

	loop {
		let n = file.read(&mut buf).map_err(|source| FingerprintError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		if n == 0 {
			break;
		}

		hasher.update(&buf[..n]);
		size += n as u64;

		if head.len() < SNIFF_HEAD_BYTES {
			let take = (SNIFF_HEAD_BYTES - head.len()).min(n);
			head.extend_from_slice(&buf[..take]);
		}
	}

	let fingerprint = Fingerprint(hasher.digest());
	tracing::debug!(%fingerprint, size, "fingerprinted file");

	Ok(FingerprintOutput { fingerprint, size, head })
}
