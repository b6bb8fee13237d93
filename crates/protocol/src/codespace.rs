//! Codespace records returned by the REST API.

use serde::{Deserialize, Serialize};

/// Lifecycle state reported for a codespace.
///
/// Unknown states deserialize to [`CodespaceState::Other`] so that new
/// server-side states do not break listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodespaceState {
	Available,
	Shutdown,
	Starting,
	Provisioning,
	ShuttingDown,
	Rebuilding,
	#[serde(other)]
	Other,
}

/// Repository a codespace was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Repository {
	pub full_name: String,
}

/// Details needed to dial a codespace's session relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
	/// Session identifier assigned by the relay.
	pub session_id: String,
	/// Bearer token presented when opening the control channel and streams.
	pub session_token: String,
	/// WebSocket endpoint of the relay (`wss://...`).
	pub relay_endpoint: String,
}

/// A remote development environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Codespace {
	/// Unique name, used as the identifier in API paths.
	pub name: String,
	#[serde(default)]
	pub display_name: Option<String>,
	pub state: CodespaceState,
	#[serde(default)]
	pub repository: Option<Repository>,
	/// Only present on the full record, not in list responses.
	#[serde(default)]
	pub connection: Option<ConnectionDetails>,
}

impl Codespace {
	/// Returns true when the codespace can accept session connections.
	pub fn is_available(&self) -> bool {
		self.state == CodespaceState::Available
	}

	/// Human-facing label: display name when set, else the name.
	pub fn label(&self) -> &str {
		self.display_name.as_deref().filter(|s| !s.is_empty()).unwrap_or(&self.name)
	}
}

/// Response body of `GET /user/codespaces`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodespaceList {
	#[serde(default)]
	pub codespaces: Vec<Codespace>,
}

/// Authenticated user as returned by `GET /user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub login: String,
}
