//! Per-job backup work: canonical field selection, destination derivation,
//! prior-record reconciliation, collision resolution, copy-verify-rename, and
//! related-sidecar copy. One call to [`run_backup_job`] drives a single
//! `BackupJob` through its whole state machine.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use crate8_catalog::{BackupRecord, IndexedFile};
use crate8_fingerprint::{fingerprint_file, related_siblings, Fingerprint, MimeClass};
use crate8_sync::PathMutexRegistry;
use tracing::{debug, instrument, warn};
use xxhash_rust::xxh3::Xxh3;

use crate::model::{BackupConfig, BackupJob};

const MAX_DEST_PATH_LEN: usize = 256;
const COPY_BUF_SIZE: usize = 64 * 1024;

/// The few fields a `BackupJob`'s replicas reduce to before a destination is
/// even considered.
struct Canonical {
	born_at: i64,
	born_source: crate8_catalog::BornSource,
	modified_at: i64,
	basename: String,
	mime_type: String,
	mime_subtype: String,
	size: u64,
	host: String,
}

fn basename_of(path: &str) -> String {
	Path::new(path).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| path.to_string())
}

/// Reduces a job's replica set to the fields a destination and a result
/// record are built from. `replicas` is never empty (the planner only
/// assembles jobs from a non-empty replica set).
fn select_canonical(replicas: &[IndexedFile]) -> Canonical {
	let (born_at, born_source) = replicas
		.iter()
		.min_by_key(|r| r.born_at)
		.map(|r| (r.born_at, r.born_source))
		.expect("BUG: backup job assembled with no replicas");
	let modified_at = replicas.iter().map(|r| r.modified_at).min().expect("BUG: backup job assembled with no replicas");

	let representative = replicas
		.iter()
		.min_by(|a, b| {
			let a_name = basename_of(&a.path);
			let b_name = basename_of(&b.path);
			a_name.len().cmp(&b_name.len()).then_with(|| a_name.cmp(&b_name))
		})
		.expect("BUG: backup job assembled with no replicas");

	Canonical {
		born_at,
		born_source,
		modified_at,
		basename: basename_of(&representative.path),
		mime_type: representative.mime_type.clone(),
		mime_subtype: representative.mime_subtype.clone(),
		size: representative.size,
		host: representative.host.clone(),
	}
}

fn is_backable_mime(mime_type: &str) -> bool {
	mime_type == MimeClass::Image.as_str() || mime_type == MimeClass::Video.as_str() || mime_type == MimeClass::Audio.as_str()
}

fn local_date_parts(tz: &Tz, unix_secs: i64) -> (i32, u32, u32) {
	let dt = match tz.timestamp_opt(unix_secs, 0) {
		chrono::LocalResult::Single(dt) => dt,
		chrono::LocalResult::Ambiguous(dt, _) => dt,
		chrono::LocalResult::None => Utc
			.timestamp_opt(unix_secs, 0)
			.single()
			.unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch is always a valid instant"))
			.with_timezone(tz),
	};
	use chrono::Datelike;
	(dt.year(), dt.month(), dt.day())
}

fn derive_destination(config: &BackupConfig, canonical: &Canonical) -> PathBuf {
	let (year, month, day) = local_date_parts(&config.default_timezone, canonical.born_at);
	config
		.backup_root
		.join(&canonical.mime_type)
		.join(format!("{year:04}"))
		.join(format!("{month:02}"))
		.join(format!("{day:02}"))
		.join(&canonical.basename)
}

fn with_appended_suffix(path: &Path, suffix: &str) -> PathBuf {
	let mut name = path.file_name().unwrap_or_default().to_os_string();
	name.push(suffix);
	path.with_file_name(name)
}

fn disambiguate(dest: &Path, fingerprint: Fingerprint) -> PathBuf {
	with_appended_suffix(dest, &format!("-{}_XXH3", fingerprint.to_hex()))
}

fn tmp_path(dest: &Path, fingerprint: Fingerprint) -> PathBuf {
	with_appended_suffix(dest, &format!("-{}.tmp", fingerprint.to_hex()))
}

fn failed_record(job: &BackupJob, canonical: &Canonical) -> BackupRecord {
	BackupRecord {
		fingerprint: job.fingerprint,
		path: String::new(),
		host: canonical.host.clone(),
		size: 0,
		modified_at: canonical.modified_at,
		born_at: canonical.born_at,
		born_source: canonical.born_source,
		mime_type: canonical.mime_type.clone(),
		mime_subtype: canonical.mime_subtype.clone(),
		info: None,
	}
}

fn copy_with_stat(source: &Path, dest: &Path) -> std::io::Result<()> {
	if let Some(parent) = dest.parent() {
		fs::create_dir_all(parent)?;
	}
	fs::copy(source, dest)?;
	preserve_stat(source, dest)
}

fn preserve_stat(source: &Path, dest: &Path) -> std::io::Result<()> {
	let meta = source.metadata()?;

	#[cfg(unix)]
	fs::set_permissions(dest, meta.permissions())?;

	let modified = filetime::FileTime::from_last_modification_time(&meta);
	let accessed = filetime::FileTime::from_last_access_time(&meta);
	filetime::set_file_times(dest, accessed, modified)
}

/// Outcome of one copy-verify attempt: whether the copied bytes matched the
/// expected fingerprint, or whether cancellation cut the copy short.
enum CopyOutcome {
	Verified(bool),
	Cancelled,
}

/// Streams `source` into `dest_tmp` (which must not already exist) while
/// hashing as it goes, then preserves mode and mtime. Checked against `cancel`
/// between chunks so a mid-copy cancellation can drop the partial `.tmp` file
/// rather than let it linger under `dest`.
fn copy_verified(source: &Path, dest_tmp: &Path, expected: Fingerprint, cancel: &AtomicBool) -> std::io::Result<CopyOutcome> {
	let mut src = fs::File::open(source)?;
	if let Some(parent) = dest_tmp.parent() {
		fs::create_dir_all(parent)?;
	}
	let mut out = fs::OpenOptions::new().write(true).create_new(true).open(dest_tmp)?;

	let mut hasher = Xxh3::new();
	let mut buf = [0u8; COPY_BUF_SIZE];
	loop {
		if cancel.load(Ordering::Relaxed) {
			drop(out);
			let _ = fs::remove_file(dest_tmp);
			return Ok(CopyOutcome::Cancelled);
		}
		let n = src.read(&mut buf)?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
		out.write_all(&buf[..n])?;
	}
	out.flush()?;
	drop(out);

	preserve_stat(source, dest_tmp)?;

	Ok(CopyOutcome::Verified(Fingerprint(hasher.digest()) == expected))
}

fn copy_related_sidecars(source: &Path, dest: &Path) {
	for sidecar in related_siblings(source) {
		let Some(ext) = sidecar.extension() else { continue };
		let dest_sidecar = dest.with_extension(ext);
		if dest_sidecar.exists() {
			continue;
		}
		if let Err(error) = copy_with_stat(&sidecar, &dest_sidecar) {
			warn!(path = %sidecar.display(), %error, "failed to copy related sidecar");
		}
	}
}

/// Drives one `BackupJob` through its state machine. Never returns an error:
/// every failure mode short-circuits to a terminal
/// `BackupRecord` (empty `path` for `FAILED`) so the pipeline can keep moving
/// and let the operator re-run. Returns `None` only on cooperative
/// cancellation mid-copy, signalling the caller to stop dispatching further
/// jobs without recording this one.
#[instrument(level = "debug", skip(job, config, registry, cancel), fields(fingerprint = %job.fingerprint))]
pub fn run_backup_job(job: &BackupJob, config: &BackupConfig, registry: &PathMutexRegistry, cancel: &AtomicBool) -> Option<BackupRecord> {
	let canonical = select_canonical(&job.replicas);

	if !is_backable_mime(&canonical.mime_type) {
		debug!(mime_type = %canonical.mime_type, "not an image/video/audio mime type, reporting zero-size record");
		return Some(BackupRecord {
			fingerprint: job.fingerprint,
			path: String::new(),
			host: canonical.host,
			size: 0,
			modified_at: canonical.modified_at,
			born_at: canonical.born_at,
			born_source: canonical.born_source,
			mime_type: canonical.mime_type,
			mime_subtype: canonical.mime_subtype,
			info: Some(r#"{"event":"skipped","reason":"non-media"}"#.to_string()),
		});
	}

	let mut dest = derive_destination(config, &canonical);
	let mut authoritative: Option<PathBuf> = None;

	// Step 4: reconcile a prior backup record, if any.
	if let Some(prior) = job.prior.as_ref().filter(|p| !p.path.is_empty()) {
		let prior_path = PathBuf::from(&prior.path);
		if prior_path.is_file() {
			let guard = registry.acquire(&prior_path);
			let rehash = fingerprint_file(&prior_path);
			drop(guard);

			match rehash {
				Ok(output) if output.fingerprint == job.fingerprint => {
					if prior_path != dest {
						match fs::rename(&prior_path, &dest) {
							Ok(()) => authoritative = Some(dest.clone()),
							Err(error) => {
								warn!(from = %prior_path.display(), to = %dest.display(), %error, "best-effort rename of prior backup failed, leaving prior path authoritative");
								dest = prior_path.clone();
								authoritative = Some(prior_path);
							}
						}
					} else {
						authoritative = Some(prior_path);
					}
				}
				Ok(_) => {
					warn!(path = %prior_path.display(), "suspected bit-rot: prior backup hash no longer matches its recorded fingerprint");
				}
				Err(error) => {
					warn!(path = %prior_path.display(), %error, "failed to rehash prior backup, treating as if no prior record existed");
				}
			}
		}
	}

	// Step 5: destination collision resolution.
	if authoritative.is_none() {
		loop {
			if cancel.load(Ordering::Relaxed) {
				return None;
			}
			if !dest.is_file() {
				break;
			}

			let guard = registry.acquire(&dest);
			let existing = fingerprint_file(&dest);
			drop(guard);

			match existing {
				Ok(output) if output.fingerprint == job.fingerprint => {
					authoritative = Some(dest.clone());
					break;
				}
				_ => {
					dest = disambiguate(&dest, job.fingerprint);
					if dest.as_os_str().len() > MAX_DEST_PATH_LEN {
						warn!(path = %dest.display(), "destination path exceeds 256 bytes after disambiguation, failing job");
						return Some(failed_record(job, &canonical));
					}
				}
			}
		}
	}

	// Step 6: copy, trying replicas in order until one verifies.
	if authoritative.is_none() {
		'replicas: for replica in &job.replicas {
			if cancel.load(Ordering::Relaxed) {
				return None;
			}

			let source_path = Path::new(&replica.path);
			match fs::metadata(source_path) {
				Ok(meta) if meta.len() == replica.size => {}
				Ok(_) => {
					warn!(path = %replica.path, "source size changed since indexing, trying next replica");
					continue;
				}
				Err(error) => {
					warn!(path = %replica.path, %error, "source vanished before copy, trying next replica");
					continue;
				}
			}

			let dest_tmp = tmp_path(&dest, job.fingerprint);
			let tmp_guard = registry.acquire(&dest_tmp);
			let copied = copy_verified(source_path, &dest_tmp, job.fingerprint, cancel);

			match copied {
				Ok(CopyOutcome::Verified(true)) => {
					let dest_guard = registry.acquire(&dest);
					let renamed = fs::rename(&dest_tmp, &dest);
					drop(dest_guard);
					drop(tmp_guard);

					match renamed {
						Ok(()) => {
							authoritative = Some(dest.clone());
							break 'replicas;
						}
						Err(error) => {
							warn!(from = %dest_tmp.display(), to = %dest.display(), %error, "failed to rename verified copy into place");
							let _ = fs::remove_file(&dest_tmp);
						}
					}
				}
				Ok(CopyOutcome::Verified(false)) => {
					drop(tmp_guard);
					warn!(path = %replica.path, "copy rehash mismatch, trying next replica");
					let _ = fs::remove_file(&dest_tmp);
				}
				Ok(CopyOutcome::Cancelled) => {
					drop(tmp_guard);
					return None;
				}
				Err(error) => {
					drop(tmp_guard);
					warn!(path = %replica.path, %error, "copy failed, trying next replica");
					let _ = fs::remove_file(&dest_tmp);
				}
			}
		}
	}

	let Some(final_dest) = authoritative else {
		warn!(fingerprint = %job.fingerprint, "no replica could be backed up");
		return Some(failed_record(job, &canonical));
	};

	// Step 7: related sidecars, sourced from whichever replica still exists.
	if let Some(source_path) = job.replicas.iter().map(|r| PathBuf::from(&r.path)).find(|p| p.is_file()) {
		copy_related_sidecars(&source_path, &final_dest);
	}

	Some(BackupRecord {
		fingerprint: job.fingerprint,
		path: final_dest.to_string_lossy().into_owned(),
		host: canonical.host,
		size: canonical.size,
		modified_at: canonical.modified_at,
		born_at: canonical.born_at,
		born_source: canonical.born_source,
		mime_type: canonical.mime_type,
		mime_subtype: canonical.mime_subtype,
		info: None,
	})
}
