//! Session trace sink.
//!
//! The runtime writes protocol-level trace lines (requests, responses,
//! stream lifecycle) into a [`SessionLog`]. Callers that do not care pass
//! [`noop_logger`], so the rest of the runtime never branches on whether
//! debugging is enabled.

use std::sync::Arc;

/// Receiver of session trace lines.
pub trait SessionLog: Send + Sync {
	fn log(&self, line: &str);
}

/// Shared handle to a trace sink.
pub type SessionLogger = Arc<dyn SessionLog>;

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLog;

impl SessionLog for NoopLog {
	fn log(&self, _line: &str) {}
}

pub fn noop_logger() -> SessionLogger {
	Arc::new(NoopLog)
}
