//! Wires the walker, the index worker pool, and the catalog writer into one
//! run: `std::thread::scope` owns one thread for the walk, N for workers, and
//! the calling thread itself drives the writer. Blocking, plain OS threads —
//! hashing and file I/O are not the kind of work that benefits from
//! cooperative yields.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate8_catalog::{Catalog, IndexedFile};
use crate8_fingerprint::ExifTool;
use crate8_walk::WalkStats;
use tracing::{error, info, instrument};

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::worker::index_one;

#[derive(Debug, Default, Clone, Copy)]
pub struct IndexRunStats {
	pub walk: WalkStats,
	pub rows_written: u64,
}

/// Runs one full index pass over `root`, writing results into `catalog`.
/// `cancel` is shared with the coordinator; setting it stops the walk and
/// worker loops between units of work, per the cooperative-cancellation model.
#[instrument(level = "info", skip(catalog, config, cancel), fields(root = %root.display(), workers = config.workers))]
pub fn run_index_pipeline(
	root: &Path,
	catalog: &mut Catalog,
	config: &IndexConfig,
	cancel: &AtomicBool,
) -> Result<IndexRunStats, IndexError> {
	root.canonicalize()
		.map_err(|source| crate8_walk::WalkError::Root { path: root.to_path_buf(), source })?;

	let snapshot = Arc::new(catalog.load_index_snapshot(&config.host)?);
	info!(known_paths = snapshot.len(), "loaded index snapshot");

	let channel_depth = config.workers.max(1) * 4;
	let (path_tx, path_rx) = crossbeam_channel::bounded::<PathBuf>(channel_depth);
	let (row_tx, row_rx) = crossbeam_channel::bounded::<(IndexedFile, Option<IndexedFile>)>(channel_depth);

	let walk_stats = Mutex::new(WalkStats::default());
	let root_owned = root.to_path_buf();

	let rows_written = std::thread::scope(|scope| -> Result<u64, IndexError> {
		scope.spawn(|| {
			match crate8_walk::walk(&root_owned, &config.ignore_file_name, &path_tx, cancel) {
				Ok(stats) => *walk_stats.lock().expect("walk stats mutex poisoned") = stats,
				Err(err) => error!(error = %err, "walker failed"),
			}
			drop(path_tx);
		});

		for worker_id in 0..config.workers.max(1) {
			let path_rx = path_rx.clone();
			let row_tx = row_tx.clone();
			let snapshot = snapshot.clone();
			scope.spawn(move || {
				let tool = ExifTool::discover(&config.exiftool_bin);
				for path in path_rx.iter() {
					if cancel.load(Ordering::Relaxed) {
						break;
					}
					if let Some(result) = index_one(&path, config, &tool, &snapshot) {
						if row_tx.send(result).is_err() {
							break;
						}
					}
				}
				tracing::debug!(worker_id, "index worker exiting");
			});
		}

		drop(row_tx);
		drop(path_rx);

		let mut writer = catalog.index_writer()?;
		for (file, prior) in row_rx.iter() {
			writer.write(&file, prior.as_ref())?;
		}
		Ok(writer.finish()?)
	})?;

	let walk = *walk_stats.lock().expect("walk stats mutex poisoned");
	info!(emitted = walk.emitted, rows_written, "index pass complete");

	Ok(IndexRunStats { walk, rows_written })
}
