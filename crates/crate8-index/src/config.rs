use std::path::PathBuf;

use chrono_tz::Tz;

/// Tuning and environment for one index run. Cheap to clone; shared
/// read-only across worker threads.
#[derive(Debug, Clone)]
pub struct IndexConfig {
	pub host: String,
	pub workers: usize,
	pub force: bool,
	pub max_file_size: u64,
	pub cache_root: PathBuf,
	pub exiftool_bin: String,
	pub default_timezone: Tz,
	pub ignore_file_name: String,
}

impl IndexConfig {
	/// Generous ceiling so that RAW and 4K/8K video survive; the knob exists so
	/// an operator can cap it tighter on constrained volumes.
	pub const DEFAULT_MAX_FILE_SIZE: u64 = 16 * 1024 * 1024 * 1024;
}
