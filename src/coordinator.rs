//! Sequences one full archiver run: open the catalog, index the originals
//! tree, and — if a backup root was given — plan and run the backup stage.
//! Owns the single cancellation flag every stage checks cooperatively, and
//! the process-singleton lock that keeps two runs from sharing one catalog.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate8_backup::{run_backup_pipeline, BackupConfig};
use crate8_catalog::Catalog;
use crate8_index::{run_index_pipeline, IndexConfig};
use fs4::FileExt;
use tracing::{info, warn};

use crate::args::Args;
use crate::error::CliError;
use crate::progress::Progress;

const LOCK_FILE_NAME: &str = "crate8.lock";
const CATALOG_FILE_NAME: &str = "catalog.db";
const DEFAULT_EXIFTOOL_BIN: &str = "exiftool";

/// Holds the run's singleton lock open for as long as the coordinator is
/// alive; dropping it releases the lock.
struct RunLock {
	_file: File,
	path: PathBuf,
}

fn acquire_run_lock(cache_root: &Path) -> Result<RunLock, CliError> {
	let path = cache_root.join(LOCK_FILE_NAME);
	let file = File::create(&path).map_err(|source| CliError::Lock { path: path.clone(), source })?;
	match file.try_lock_exclusive() {
		Ok(()) => Ok(RunLock { _file: file, path }),
		Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => Err(CliError::AlreadyRunning { path }),
		Err(source) => Err(CliError::Lock { path, source }),
	}
}

impl Drop for RunLock {
	fn drop(&mut self) {
		if let Err(error) = self._file.unlock() {
			warn!(path = %self.path.display(), %error, "failed to release run lock");
		}
	}
}

fn resolve_cache_root(args: &Args) -> PathBuf {
	if let Some(cache) = &args.cache {
		return cache.clone();
	}
	match &args.backup {
		Some(backup_root) => backup_root.join(".cache8"),
		None => std::env::temp_dir().join("cache8"),
	}
}

fn resolve_timezone(args: &Args) -> chrono_tz::Tz {
	if let Some(name) = &args.timezone {
		if let Ok(tz) = name.parse() {
			return tz;
		}
		warn!(timezone = %name, "unrecognised --timezone, falling back to the process default");
	}

	iana_time_zone::get_timezone()
		.ok()
		.and_then(|name| name.parse().ok())
		.unwrap_or(chrono_tz::UTC)
}

/// Installs a `ctrlc` handler that sets `cancel` on the first SIGINT/SIGTERM
/// and hard-exits the process (code 2) on a second, matching the archiver's
/// exit code table.
fn install_signal_handler(cancel: Arc<AtomicBool>) -> miette::Result<()> {
	use miette::IntoDiagnostic;

	ctrlc::set_handler(move || {
		if cancel.swap(true, Ordering::SeqCst) {
			warn!("second interrupt received, exiting immediately");
			std::process::exit(2);
		}
		warn!("interrupt received, finishing in-flight work and stopping");
	})
	.into_diagnostic()
}

/// Runs one full archive pass for `args`. Returns the same `CliError` shape
/// the caller maps to an exit code; a clean `Ok(())` is exit 0.
pub async fn run(args: Args) -> Result<(), CliError> {
	let started = Instant::now();

	let originals = args.originals.canonicalize().map_err(|error| CliError::BadPath {
		path: args.originals.clone(),
		reason: error.to_string(),
	})?;
	if !originals.is_dir() {
		return Err(CliError::BadPath { path: originals, reason: "not a directory".to_string() });
	}

	let cache_root = resolve_cache_root(&args);
	fs::create_dir_all(&cache_root).map_err(|source| CliError::Io { path: cache_root.clone(), source })?;

	let _lock = acquire_run_lock(&cache_root)?;

	let progress = Progress::new();
	let _log_guard = crate::logging::setup(args.verbose.unwrap_or(0), args.log_file.clone(), args.color, &progress)
		.map_err(|error| CliError::Setup(error.to_string()))?;

	info!(version = %env!("CARGO_PKG_VERSION"), originals = %originals.display(), "starting up");

	let host = hostname();
	let default_timezone = resolve_timezone(&args);
	let cancel = Arc::new(AtomicBool::new(false));
	install_signal_handler(Arc::clone(&cancel)).map_err(|error| CliError::Setup(error.to_string()))?;

	let mut catalog = Catalog::open(&cache_root.join(CATALOG_FILE_NAME))?;

	let index_config = IndexConfig {
		host: host.clone(),
		workers: args.workers.max(1),
		force: args.force,
		max_file_size: IndexConfig::DEFAULT_MAX_FILE_SIZE,
		cache_root: cache_root.clone(),
		exiftool_bin: DEFAULT_EXIFTOOL_BIN.to_string(),
		default_timezone,
		ignore_file_name: crate8_walk::DEFAULT_IGNORE_FILE_NAME.to_string(),
	};

	let index_bar = progress.stage_spinner("indexing originals");
	let index_stats = run_index_pipeline(&originals, &mut catalog, &index_config, &cancel)?;
	index_bar.finish_and_clear();
	info!(
		emitted = index_stats.walk.emitted,
		rows_written = index_stats.rows_written,
		"index stage complete"
	);

	if let Some(backup_root) = &args.backup {
		if cancel.load(Ordering::Relaxed) {
			warn!("skipping backup stage, run was cancelled");
		} else {
			fs::create_dir_all(backup_root).map_err(|source| CliError::Io { path: backup_root.clone(), source })?;

			let backup_config = BackupConfig {
				host,
				workers: args.workers.max(1),
				backup_root: backup_root.clone(),
				default_timezone,
			};

			let backup_bar = progress.stage_spinner("backing up fingerprints");
			let backup_stats = run_backup_pipeline(&mut catalog, &backup_config, &cancel)?;
			backup_bar.finish_and_clear();
			info!(
				jobs_planned = backup_stats.jobs_planned,
				jobs_done = backup_stats.jobs_done,
				jobs_failed = backup_stats.jobs_failed,
				"backup stage complete"
			);
		}
	}

	if args.cleanup {
		info!("--cleanup is reserved and does not remove anything in this build");
	}

	info!(elapsed = %humantime::format_duration(started.elapsed()), "run complete");
	Ok(())
}

/// Host identifier recorded against every catalog row from this machine.
/// Falls back to a fixed placeholder on the rare platform where the OS
/// doesn't report one, rather than failing the whole run over it.
fn hostname() -> String {
	gethostname::gethostname().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolve_cache_root_defaults_under_backup_root() {
		let args = Args {
			originals: PathBuf::from("."),
			backup: Some(PathBuf::from("/mnt/backup")),
			cache: None,
			workers: 4,
			force: false,
			cleanup: false,
			timezone: None,
			color: crate::args::ColourMode::Auto,
			verbose: None,
			log_file: None,
		};
		assert_eq!(resolve_cache_root(&args), PathBuf::from("/mnt/backup/.cache8"));
	}

	#[test]
	fn resolve_cache_root_falls_back_to_temp_without_backup() {
		let args = Args {
			originals: PathBuf::from("."),
			backup: None,
			cache: None,
			workers: 4,
			force: false,
			cleanup: false,
			timezone: None,
			color: crate::args::ColourMode::Auto,
			verbose: None,
			log_file: None,
		};
		assert_eq!(resolve_cache_root(&args), std::env::temp_dir().join("cache8"));
	}

	#[test]
	fn resolve_cache_root_honours_explicit_flag() {
		let args = Args {
			originals: PathBuf::from("."),
			backup: Some(PathBuf::from("/mnt/backup")),
			cache: Some(PathBuf::from("/srv/cache8")),
			workers: 4,
			force: false,
			cleanup: false,
			timezone: None,
			color: crate::args::ColourMode::Auto,
			verbose: None,
			log_file: None,
		};
		assert_eq!(resolve_cache_root(&args), PathBuf::from("/srv/cache8"));
	}
}
