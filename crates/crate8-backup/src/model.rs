use std::path::PathBuf;

use chrono_tz::Tz;
use crate8_catalog::{BackupRecord, IndexedFile};
use crate8_fingerprint::Fingerprint;

/// Tuning and environment for one backup run. Cheap to clone; shared
/// read-only across worker threads.
#[derive(Debug, Clone)]
pub struct BackupConfig {
	pub host: String,
	pub workers: usize,
	pub backup_root: PathBuf,
	pub default_timezone: Tz,
}

/// One unit of backup work: every replica of a single fingerprint, plus
/// whatever `backups` row already exists for it (if any).
#[derive(Debug, Clone)]
pub struct BackupJob {
	pub fingerprint: Fingerprint,
	pub replicas: Vec<IndexedFile>,
	pub prior: Option<BackupRecord>,
}
