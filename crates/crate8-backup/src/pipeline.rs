//! Wires the planner and the backup worker pool into one run: a fixed pool of
//! worker threads consumes planned jobs over a bounded channel, the calling
//! thread drives the single `backups`-table writer, mirroring the index
//! pipeline's walk → workers → writer shape.

use std::sync::atomic::{AtomicBool, Ordering};

use crate8_catalog::{BackupRecord, Catalog};
use crate8_sync::PathMutexRegistry;
use tracing::{info, instrument};

use crate::error::BackupError;
use crate::model::BackupConfig;
use crate::planner::plan_jobs;
use crate::worker::run_backup_job;

#[derive(Debug, Default, Clone, Copy)]
pub struct BackupRunStats {
	pub jobs_planned: u64,
	pub jobs_done: u64,
	pub jobs_failed: u64,
	pub rows_written: u64,
}

/// Plans and runs one full backup pass for `config.host`, writing results
/// into `catalog`. `cancel` is shared with the coordinator; setting it stops
/// dispatch and lets in-flight jobs finish or cooperatively abandon mid-copy.
#[instrument(level = "info", skip(catalog, config, cancel), fields(host = %config.host, workers = config.workers))]
pub fn run_backup_pipeline(catalog: &mut Catalog, config: &BackupConfig, cancel: &AtomicBool) -> Result<BackupRunStats, BackupError> {
	let jobs = plan_jobs(catalog, &config.host)?;
	let jobs_planned = jobs.len() as u64;
	info!(jobs_planned, "planned backup jobs");

	let channel_depth = config.workers.max(1) * 4;
	let (job_tx, job_rx) = crossbeam_channel::bounded::<crate::model::BackupJob>(channel_depth);
	let (record_tx, record_rx) = crossbeam_channel::bounded::<(bool, BackupRecord)>(channel_depth);
	let registry = PathMutexRegistry::new();

	let (rows_written, jobs_done, jobs_failed) = std::thread::scope(|scope| -> Result<(u64, u64, u64), BackupError> {
		scope.spawn(|| {
			for job in jobs {
				if cancel.load(Ordering::Relaxed) || job_tx.send(job).is_err() {
					break;
				}
			}
		});

		for worker_id in 0..config.workers.max(1) {
			let job_rx = job_rx.clone();
			let record_tx = record_tx.clone();
			let registry = &registry;
			scope.spawn(move || {
				for job in job_rx.iter() {
					if cancel.load(Ordering::Relaxed) {
						break;
					}
					let had_prior = job.prior.is_some();
					if let Some(record) = run_backup_job(&job, config, registry, cancel) {
						if record_tx.send((had_prior, record)).is_err() {
							break;
						}
					}
				}
				tracing::debug!(worker_id, "backup worker exiting");
			});
		}

		drop(record_tx);
		drop(job_rx);

		let mut writer = catalog.backup_writer()?;
		let mut jobs_done = 0u64;
		let mut jobs_failed = 0u64;
		for (had_prior, record) in record_rx.iter() {
			if record.path.is_empty() {
				jobs_failed += 1;
			} else {
				jobs_done += 1;
			}
			writer.write(&record, had_prior)?;
		}
		Ok((writer.finish()?, jobs_done, jobs_failed))
	})?;

	info!(jobs_done, jobs_failed, rows_written, "backup pass complete");
	Ok(BackupRunStats { jobs_planned, jobs_done, jobs_failed, rows_written })
}
