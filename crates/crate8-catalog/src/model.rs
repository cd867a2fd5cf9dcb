use std::fmt;
use std::str::FromStr;

use crate8_fingerprint::Fingerprint;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Where a row's `born_at` timestamp came from, in descending order of trust:
/// embedded capture metadata, a date parsed out of the filename, or the
/// filesystem's own modification time as a last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BornSource {
	Meta,
	Name,
	Stat,
}

impl fmt::Display for BornSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			BornSource::Meta => "meta",
			BornSource::Name => "name",
			BornSource::Stat => "stat",
		})
	}
}

impl FromStr for BornSource {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"meta" => Ok(BornSource::Meta),
			"name" => Ok(BornSource::Name),
			"stat" => Ok(BornSource::Stat),
			other => Err(format!("unrecognised born_source {other:?}")),
		}
	}
}

impl ToSql for BornSource {
	fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
		Ok(ToSqlOutput::from(self.to_string()))
	}
}

impl FromSql for BornSource {
	fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
		value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
	}
}

/// One row of the `files` table: a single `(path, host)` observation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFile {
	pub path: String,
	pub host: String,
	pub fingerprint: Fingerprint,
	pub size: u64,
	pub modified_at: i64,
	pub born_at: i64,
	pub born_source: BornSource,
	pub mime_type: String,
	pub mime_subtype: String,
	pub info: Option<String>,
}

/// One row of the `backups` table: the single authoritative backup for a
/// distinct fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
	pub fingerprint: Fingerprint,
	pub path: String,
	pub host: String,
	pub size: u64,
	pub modified_at: i64,
	pub born_at: i64,
	pub born_source: BornSource,
	pub mime_type: String,
	pub mime_subtype: String,
	pub info: Option<String>,
}

impl BackupRecord {
	/// A record with an empty `path` signals "not backed up to disk" — the
	/// backup worker pool's `FAILED` terminal state.
	pub fn is_failed(&self) -> bool {
		self.path.is_empty()
	}
}
