//! JSON-RPC envelope used on the session control channel.
//!
//! Requests carry a sequential `id`; the remote side answers with a
//! [`Response`] echoing that id. Messages without an id are [`Event`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to the remote session host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique request ID for correlating responses
	pub id: u32,
	/// Method name to invoke
	pub method: String,
	/// Method parameters as JSON
	pub params: Value,
}

/// Response message from the remote session host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Request ID this response correlates to
	pub id: u32,
	/// Success result (mutually exclusive with error)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
}

/// Remote error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub message: String,
	/// Numeric JSON-RPC error code, when the host supplies one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<i64>,
}

/// Unsolicited notification from the remote session host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of control-channel messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Event message (no `id` field)
	Event(Event),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}
