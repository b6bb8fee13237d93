//! Session trace file written with `--debug`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use cs_runtime::SessionLog;
use parking_lot::Mutex;

/// Appends timestamped session trace lines to a file.
pub struct FileLogger {
	path: PathBuf,
	writer: Mutex<Option<BufWriter<File>>>,
}

impl FileLogger {
	/// Creates (truncating) the log at `path`, or at a fresh file in the temp
	/// dir when `path` is `None`.
	pub fn create(path: Option<&Path>) -> std::io::Result<Self> {
		let path = match path {
			Some(path) => path.to_path_buf(),
			None => default_path(),
		};
		let file = File::create(&path)?;
		Ok(Self {
			path,
			writer: Mutex::new(Some(BufWriter::new(file))),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Flushes and closes the file. Later lines are dropped.
	pub fn close(&self) -> std::io::Result<()> {
		match self.writer.lock().take() {
			Some(mut writer) => {
				writer.flush()?;
				writer.get_ref().sync_all()
			}
			None => Ok(()),
		}
	}
}

impl SessionLog for FileLogger {
	fn log(&self, line: &str) {
		if let Some(writer) = self.writer.lock().as_mut() {
			let millis = SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.map(|d| d.as_millis())
				.unwrap_or_default();
			if let Err(e) = writeln!(writer, "{millis} {line}") {
				tracing::debug!(error = %e, "failed to write debug log");
			}
		}
	}
}

fn default_path() -> PathBuf {
	let secs = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or_default();
	std::env::temp_dir().join(format!("cs-jupyter-{secs}.log"))
}
