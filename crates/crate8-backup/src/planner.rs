//! Assembles the unit of work for the backup worker pool: one `BackupJob` per
//! distinct fingerprint, read straight off the catalog. No filesystem access
//! happens here — that's entirely the worker pool's job.

use crate8_catalog::{BornSource, Catalog};
use tracing::{instrument, warn};

use crate::error::BackupError;
use crate::model::BackupJob;

/// Plans every `BackupJob` for `host`. A fingerprint whose replicas disagree
/// on `size` is a suspected hash collision or bit-rot and is skipped (logged,
/// not fatal); a fingerprint whose `born_source = meta` replicas disagree on
/// `born_at` is a fatal inconsistency that aborts planning entirely, since it
/// suggests the catalog itself is untrustworthy.
#[instrument(level = "debug", skip(catalog))]
pub fn plan_jobs(catalog: &Catalog, host: &str) -> Result<Vec<BackupJob>, BackupError> {
	let fingerprints = catalog.distinct_fingerprints_for_host(host)?;
	let mut jobs = Vec::with_capacity(fingerprints.len());

	for fingerprint in fingerprints {
		let replicas = catalog.replicas_for_fingerprint(host, fingerprint)?;
		let Some(first) = replicas.first() else {
			continue;
		};

		if replicas.iter().any(|r| r.size != first.size) {
			warn!(%fingerprint, "replicas disagree on size, skipping fingerprint (possible hash collision or bit-rot)");
			continue;
		}

		let mut meta_born_ats = replicas.iter().filter(|r| r.born_source == BornSource::Meta).map(|r| r.born_at);
		if let Some(first_born_at) = meta_born_ats.next() {
			if meta_born_ats.any(|born_at| born_at != first_born_at) {
				return Err(BackupError::Inconsistent {
					fingerprint,
					reason: "replicas with born_source=meta disagree on born_at".to_string(),
				});
			}
		}

		let prior = catalog.backup_record_for_fingerprint(fingerprint)?;
		jobs.push(BackupJob { fingerprint, replicas, prior });
	}

	Ok(jobs)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate8_catalog::IndexedFile;
	use crate8_fingerprint::Fingerprint;

	fn file(path: &str, fingerprint: u64, size: u64, born_at: i64, born_source: BornSource) -> IndexedFile {
		IndexedFile {
			path: path.to_string(),
			host: "testhost".to_string(),
			fingerprint: Fingerprint(fingerprint),
			size,
			modified_at: born_at,
			born_at,
			born_source,
			mime_type: "image".to_string(),
			mime_subtype: "jpeg".to_string(),
			info: None,
		}
	}

	#[test]
	fn one_job_per_fingerprint_with_no_prior() {
		let dir = tempfile::tempdir().unwrap();
		let mut catalog = Catalog::open(&dir.path().join("catalog.sqlite3")).unwrap();
		{
			let mut writer = catalog.index_writer().unwrap();
			writer.write(&file("/a.jpg", 1, 10, 100, BornSource::Stat), None).unwrap();
			writer.write(&file("/b.jpg", 1, 10, 100, BornSource::Stat), None).unwrap();
			writer.finish().unwrap();
		}

		let jobs = plan_jobs(&catalog, "testhost").unwrap();
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].replicas.len(), 2);
		assert!(jobs[0].prior.is_none());
	}

	#[test]
	fn size_disagreement_skips_the_fingerprint() {
		let dir = tempfile::tempdir().unwrap();
		let mut catalog = Catalog::open(&dir.path().join("catalog.sqlite3")).unwrap();
		{
			let mut writer = catalog.index_writer().unwrap();
			writer.write(&file("/a.jpg", 1, 10, 100, BornSource::Stat), None).unwrap();
			writer.write(&file("/b.jpg", 1, 20, 100, BornSource::Stat), None).unwrap();
			writer.finish().unwrap();
		}

		assert!(plan_jobs(&catalog, "testhost").unwrap().is_empty());
	}

	#[test]
	fn meta_born_at_disagreement_is_fatal() {
		let dir = tempfile::tempdir().unwrap();
		let mut catalog = Catalog::open(&dir.path().join("catalog.sqlite3")).unwrap();
		{
			let mut writer = catalog.index_writer().unwrap();
			writer.write(&file("/a.jpg", 1, 10, 100, BornSource::Meta), None).unwrap();
			writer.write(&file("/b.jpg", 1, 10, 200, BornSource::Meta), None).unwrap();
			writer.finish().unwrap();
		}

		assert!(matches!(plan_jobs(&catalog, "testhost"), Err(BackupError::Inconsistent { .. })));
	}
}
