//! Payloads of the session services used by the CLI.

use serde::{Deserialize, Serialize};

/// Method asking the host for the running JupyterLab server, starting it if needed.
pub const JUPYTER_GET_RUNNING_SERVER: &str = "IJupyterServerHostService.getRunningServer";
/// Method sharing a remote port so that streams can be opened to it.
pub const START_SHARING: &str = "serverSharing.startSharing";
/// Method resolving a shared port into a stream that can be dialed.
pub const GET_STREAM: &str = "streamManager.getStream";
/// Event emitted by the host right before it tears the session down.
pub const SESSION_TERMINATED: &str = "session.terminated";

/// Service label used when sharing the JupyterLab port.
pub const JUPYTER_SERVICE: &str = "jupyter";

/// Result of [`JUPYTER_GET_RUNNING_SERVER`].
///
/// The port is transmitted as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JupyterServerInfo {
	pub result: bool,
	#[serde(default)]
	pub message: String,
	#[serde(default)]
	pub port: String,
	#[serde(default)]
	pub server_url: String,
}

/// Parameters of [`START_SHARING`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePortRequest {
	pub port: u16,
	pub name: String,
	pub protocol: String,
}

/// Result of [`START_SHARING`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedServer {
	pub stream_name: String,
	pub stream_condition: String,
}

/// Parameters of [`GET_STREAM`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStreamRequest {
	pub stream_name: String,
	pub condition: String,
}

/// Result of [`GET_STREAM`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
	pub stream_id: String,
}
