use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, WrapErr};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::args::ColourMode;
use crate::progress::Progress;

/// Filter directive for a `-v` count, 0..=5. Above 2 the archiver's own
/// crates are named explicitly so third-party dependency noise doesn't drown
/// out per-file diagnostics.
fn directive_for(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "info",
		1 => "info,crate8=debug,crate8_index=debug,crate8_backup=debug",
		2 => "debug",
		3 => "debug,crate8=trace,crate8_index=trace,crate8_backup=trace",
		4 => "trace,crate8=trace",
		_ => "trace",
	}
}

/// If `path` is a directory (or the `.` default), derives a timestamped file
/// name inside it; otherwise splits it into a parent directory and file name.
/// Either way the directory is created if it doesn't exist yet.
fn split_log_target(path: &Path) -> miette::Result<(PathBuf, String)> {
	let (dir, name) = if path.as_os_str() == "." || path.is_dir() {
		let stamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%SZ");
		(path.to_path_buf(), format!("crate8.{stamp}.log"))
	} else {
		let dir = path
			.parent()
			.filter(|parent| !parent.as_os_str().is_empty())
			.map(Path::to_path_buf)
			.unwrap_or_else(|| PathBuf::from("."));
		let name = path
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| "crate8.log".to_string());
		(dir, name)
	};

	fs::create_dir_all(&dir).into_diagnostic().wrap_err("creating log file directory")?;
	Ok((dir, name))
}

/// Installs the global tracing subscriber: plain ANSI text to stderr by
/// default (routed through `progress` so log lines never tear a progress
/// bar's redraw), or JSON to a file when `log_file` is set (bumping verbosity
/// to at least '-vvv' if the caller asked for less, since file logs are for
/// later reading rather than live viewing).
pub fn setup(verbosity: u8, log_file: Option<PathBuf>, color: ColourMode, progress: &Progress) -> miette::Result<WorkerGuard> {
	let has_log_file = log_file.is_some();
	let verbosity = if has_log_file { verbosity.max(3) } else { verbosity };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive_for(verbosity)));

	match log_file {
		Some(path) => {
			let (dir, name) = split_log_target(&path)?;
			let appender = tracing_appender::rolling::never(dir, name);
			let (writer, guard) = tracing_appender::non_blocking(appender);
			tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_writer(writer)
				.with_ansi(false)
				.json()
				.try_init()
				.map_err(|error| miette::miette!("{error}"))
				.wrap_err("installing tracing subscriber")?;
			Ok(guard)
		}
		None => {
			let ansi = match color {
				ColourMode::Always => true,
				ColourMode::Never => false,
				ColourMode::Auto => std::io::stderr().is_terminal(),
			};
			let (writer, guard) = tracing_appender::non_blocking(progress.writer());
			tracing_subscriber::fmt()
				.with_env_filter(filter)
				.with_writer(writer)
				.with_ansi(ansi)
				.try_init()
				.map_err(|error| miette::miette!("{error}"))
				.wrap_err("installing tracing subscriber")?;
			Ok(guard)
		}
	}
}
