use thiserror::Error;

use crate8_fingerprint::Fingerprint;

#[derive(Debug, Error)]
pub enum BackupError {
	#[error(transparent)]
	Catalog(#[from] crate8_catalog::CatalogError),

	/// Replicas sharing a fingerprint disagree on something a hash collision
	/// can't explain away: a `born_source = meta` split on `born_at`. Treated
	/// as a fatal inconsistency rather than a per-fingerprint skip, since it
	/// suggests the catalog itself recorded contradictory metadata.
	#[error("replicas of fingerprint {fingerprint} disagree: {reason}")]
	Inconsistent { fingerprint: Fingerprint, reason: String },
}
