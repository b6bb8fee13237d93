//! Stage notices for interactive use.

use crate::app::Progress;

/// Prints each stage on stderr, where it stays out of piped output.
pub struct StderrProgress;

impl Progress for StderrProgress {
	fn stage(&self, label: &str) {
		eprintln!("{label}...");
	}
}
