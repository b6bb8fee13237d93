//! Error types for the codespace runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the codespace runtime.
///
/// The forwarder reports *why* it stopped through this type as well, so
/// several variants describe terminations rather than faults.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish the control channel or a data stream.
	#[error("failed to connect to session relay: {0}")]
	ConnectionFailed(String),

	/// Relay endpoint could not be turned into a stream URL.
	#[error("invalid relay endpoint {endpoint:?}: {reason}")]
	InvalidEndpoint { endpoint: String, reason: String },

	/// Transport-level error (WebSocket framing).
	#[error("transport error: {0}")]
	TransportError(String),

	/// Protocol-level error (JSON-RPC).
	#[error("protocol error: {0}")]
	ProtocolError(String),

	/// Error returned by the session host.
	#[error("remote error: {message}")]
	Remote { message: String, code: Option<i64> },

	/// The host reported that JupyterLab could not be started.
	#[error("failed to start JupyterLab: {0}")]
	JupyterUnavailable(String),

	/// The host reported a port that is not a valid TCP port.
	#[error("failed to parse JupyterLab port {value:?}: {source}")]
	InvalidPort {
		value: String,
		#[source]
		source: std::num::ParseIntError,
	},

	/// Pending request lost its response channel.
	#[error("channel closed unexpectedly")]
	ChannelClosed,

	/// The session was terminated by either side.
	#[error("session closed")]
	SessionClosed,

	/// Forwarding stopped because cancellation was requested.
	#[error("forwarding cancelled")]
	Cancelled,

	/// The only local client of a single-connection tunnel disconnected.
	#[error("local connection closed")]
	ConnectionClosed,

	/// Copying bytes between the local client and the remote stream failed.
	#[error("tunnel connection: {0}")]
	Tunnel(#[source] std::io::Error),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if forwarding stopped because of cancellation.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled)
	}
}
