use std::io::{stderr, IsTerminal, Write};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::Metadata;
use tracing_subscriber::fmt::MakeWriter;

/// One `MultiProgress` shared by every stage bar in a run, plus the means to
/// route log lines around whatever bars are currently drawn.
#[derive(Clone, Debug, Default)]
pub struct Progress(MultiProgress);

impl Progress {
	pub fn new() -> Self {
		Self(MultiProgress::new())
	}

	/// A spinner for a pipeline stage whose item count isn't known up front.
	/// Hidden when stderr isn't a terminal, same as the rest of this codebase's
	/// progress bars.
	pub fn stage_spinner(&self, label: &str) -> ProgressBar {
		let bar = if stderr().is_terminal() {
			let style = ProgressStyle::default_spinner()
				.template("{spinner:.cyan} {msg} ({elapsed})")
				.expect("BUG: progress bar template invalid");
			self.0.add(ProgressBar::new_spinner().with_style(style))
		} else {
			ProgressBar::hidden()
		};
		bar.set_message(label.to_string());
		bar.enable_steady_tick(Duration::from_millis(120));
		bar
	}

	pub fn writer(&self) -> ProgressLogWriter {
		ProgressLogWriter(self.0.clone())
	}
}

/// A `tracing_subscriber` writer that suspends every active progress bar for
/// the duration of each write, so log lines never get interleaved with a
/// bar's redraw.
#[derive(Clone, Debug)]
pub struct ProgressLogWriter(MultiProgress);

impl Write for ProgressLogWriter {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.0.suspend(|| stderr().write(buf))
	}

	fn flush(&mut self) -> std::io::Result<()> {
		self.0.suspend(|| stderr().flush())
	}
}

impl<'w> MakeWriter<'w> for Progress {
	type Writer = ProgressLogWriter;

	fn make_writer(&'w self) -> Self::Writer {
		self.writer()
	}

	fn make_writer_for(&'w self, _meta: &Metadata<'_>) -> Self::Writer {
		self.writer()
	}
}
