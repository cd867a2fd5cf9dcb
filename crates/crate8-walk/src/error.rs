use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalkError {
	#[error("resolving walk root {path}: {source}")]
	Root {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}
