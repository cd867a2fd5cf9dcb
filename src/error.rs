use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level errors the coordinator can fail with. Distinguishes a bad
/// invocation (exit 1) from a fatal run-time failure (exit 4); hard
/// interrupts don't come through here at all, since the signal handler exits
/// the process directly.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
	#[error("{path}: {reason}")]
	#[diagnostic(code(crate8::bad_path))]
	BadPath { path: PathBuf, reason: String },

	#[error("another crate8 run already holds the lock at {path}")]
	#[diagnostic(code(crate8::already_running))]
	AlreadyRunning { path: PathBuf },

	#[error("acquiring run lock at {path}: {source}")]
	#[diagnostic(code(crate8::lock))]
	Lock { path: PathBuf, #[source] source: std::io::Error },

	#[error("{path}: {source}")]
	#[diagnostic(code(crate8::io))]
	Io { path: PathBuf, #[source] source: std::io::Error },

	#[error("starting up: {0}")]
	#[diagnostic(code(crate8::setup))]
	Setup(String),

	#[error(transparent)]
	#[diagnostic(code(crate8::catalog))]
	Catalog(#[from] crate8_catalog::CatalogError),

	#[error(transparent)]
	#[diagnostic(code(crate8::index))]
	Index(#[from] crate8_index::IndexError),

	#[error(transparent)]
	#[diagnostic(code(crate8::backup))]
	Backup(#[from] crate8_backup::BackupError),
}

impl CliError {
	/// Process exit code for this error, per the archiver's exit code table.
	pub fn exit_code(&self) -> i32 {
		match self {
			CliError::BadPath { .. } | CliError::AlreadyRunning { .. } => 1,
			_ => 4,
		}
	}
}
