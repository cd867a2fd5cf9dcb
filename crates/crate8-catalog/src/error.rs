use thiserror::Error;

/// Errors raised by the catalog store. A commit or schema failure is always
/// fatal to the pipeline; this crate does not attempt to retry or heal.
#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("opening catalog database: {0}")]
	Open(#[source] rusqlite::Error),

	#[error("preparing schema: {0}")]
	Schema(#[source] rusqlite::Error),

	#[error("querying catalog: {0}")]
	Query(#[source] rusqlite::Error),

	#[error("writing to catalog: {0}")]
	Write(#[source] rusqlite::Error),

	#[error("starting transaction: {0}")]
	BeginTransaction(#[source] rusqlite::Error),

	#[error("committing transaction: {0}")]
	Commit(#[source] rusqlite::Error),

	#[error("serialising prior row for audit trail: {0}")]
	AuditSerialize(#[source] serde_json::Error),
}
