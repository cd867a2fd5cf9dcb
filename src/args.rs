use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use tracing::debug;

/// Content-addressed media archiver: indexes a tree of originals into a
/// catalog, deduplicating by content, and optionally backs up one canonical
/// copy per distinct fingerprint.
#[derive(Debug, Clone, Parser)]
#[command(
	author,
	version,
	long_version = format!("{} built from branch={} commit={} dirty={} source_timestamp={}",
		env!("CARGO_PKG_VERSION"),
		env!("GIT_BRANCH"),
		env!("GIT_COMMIT"),
		env!("GIT_DIRTY"),
		env!("SOURCE_TIMESTAMP"),
	),
	after_help = "Want more detail? Try the long '--help' flag!",
	after_long_help = "Didn't expect this much output? Use the short '-h' flag to get short help.",
)]
#[cfg_attr(debug_assertions, command(before_help = "⚠ DEBUG BUILD ⚠"))]
pub struct Args {
	/// Root directory of the originals to index
	///
	/// Scanned recursively. A `.bpignore` file in any directory skips matching
	/// entries, directories included, wholesale.
	#[arg(value_hint = ValueHint::DirPath)]
	pub originals: PathBuf,

	/// Enable the backup stage, copying one deduplicated original per
	/// fingerprint under this destination root
	#[arg(long, short = 'b', value_hint = ValueHint::DirPath, value_name = "PATH")]
	pub backup: Option<PathBuf>,

	/// Working directory for the catalog database and the EXIF metadata cache
	///
	/// Defaults to '.cache8' under the backup root, or a directory under the
	/// system temp directory when no backup root is given.
	#[arg(long, short = 's', value_hint = ValueHint::DirPath, value_name = "PATH")]
	pub cache: Option<PathBuf>,

	/// Worker-pool size for both the index and the backup stage
	#[arg(long, short = 'n', default_value_t = 4)]
	pub workers: usize,

	/// Re-index every file even if its size and modification time are
	/// unchanged since the last run
	#[arg(long, short)]
	pub force: bool,

	/// Remove orphan cache entries
	///
	/// Reserved for a future release; currently accepted and parsed but does
	/// not remove anything.
	#[arg(long, short)]
	pub cleanup: bool,

	/// Overrides the local timezone used to derive the destination date path
	///
	/// Accepts an IANA zone name (e.g. 'Pacific/Auckland'). Defaults to the
	/// process's own local timezone.
	#[arg(long, value_name = "IANA-NAME")]
	pub timezone: Option<String>,

	/// When to use terminal colours
	#[arg(long, default_value = "auto", value_name = "MODE", alias = "colour")]
	pub color: ColourMode,

	/// Set diagnostic log level
	///
	/// This enables diagnostic logging, which is useful for investigating
	/// bugs. Use multiple times to increase verbosity. Goes up to '-vvvvv'.
	///
	/// You may want to use this with '--log-file' to avoid polluting your
	/// terminal.
	#[arg(long, short, action = ArgAction::Count, num_args = 0)]
	pub verbose: Option<u8>,

	/// Write diagnostic logs to a file in JSON format, instead of the terminal
	///
	/// If the path given is a directory (or omitted, which defaults to the
	/// current directory), a file is created in it, named for the current
	/// date and time. If a log level wasn't already given, this bumps it to
	/// '-vvv'.
	#[arg(
		long,
		num_args = 0..=1,
		default_missing_value = ".",
		value_hint = ValueHint::AnyPath,
		value_name = "PATH",
	)]
	pub log_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ColourMode {
	Auto,
	Always,
	Never,
}

/// Parses CLI arguments. Logging isn't up yet at this point (it needs the
/// coordinator's progress bars to route around), so only the env-var warning
/// below is eager; everything else is just `clap::Parser::parse`.
pub fn get_args() -> Args {
	if std::env::var("RUST_LOG").is_ok() {
		eprintln!("warning: RUST_LOG environment variable set, -v/--log-file have no effect");
	}

	let args = Args::parse();
	debug!(?args, "parsed arguments");
	args
}

#[test]
fn verify_cli() {
	use clap::CommandFactory;
	Args::command().debug_assert()
}
