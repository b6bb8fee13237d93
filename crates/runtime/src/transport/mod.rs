//! Control-channel transport.
//!
//! A transport is split into a [`Transport`] (outbound half, owned by the
//! connection's writer task) and a [`TransportReceiver`] (inbound half, run on
//! its own task and feeding parsed JSON into an unbounded channel). The pair
//! plus that channel travel together as [`TransportParts`].

#[cfg(test)]
pub(crate) mod fake;

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

/// WebSocket stream type used for both the control channel and data streams.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound half of a transport.
pub trait Transport: Send {
	/// Sends one JSON message.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Closes the underlying channel. Safe to call more than once.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Inbound half of a transport.
pub trait TransportReceiver: Send {
	/// Reads messages until the peer closes or an error occurs.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Transport halves plus the channel carrying inbound messages.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Opens a WebSocket, presenting `token` as a bearer credential when given.
pub async fn connect_websocket(url: &str, token: Option<&str>) -> Result<WsStream> {
	let mut request = url
		.into_client_request()
		.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;

	if let Some(token) = token {
		let value = HeaderValue::from_str(&format!("Bearer {token}"))
			.map_err(|e| Error::ConnectionFailed(format!("invalid session token: {e}")))?;
		request.headers_mut().insert(AUTHORIZATION, value);
	}

	let (ws, _response) = tokio_tungstenite::connect_async(request)
		.await
		.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
	Ok(ws)
}

/// JSON-over-WebSocket transport for the session control channel.
///
/// Each text frame carries exactly one JSON message.
pub struct WebSocketTransport {
	sink: SplitSink<WsStream, Message>,
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport {
	/// Connects to `url` and returns the transport plus its inbound channel.
	pub async fn connect(url: &str, token: Option<&str>) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		let ws = connect_websocket(url, token).await?;
		Ok(Self::from_stream(ws))
	}

	/// Wraps an already-established WebSocket.
	pub fn from_stream(ws: WsStream) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (sink, stream) = ws.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(
			Self {
				sink,
				stream,
				message_tx,
			},
			message_rx,
		)
	}

	/// Splits into boxed halves ready for a [`Connection`](crate::Connection).
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		TransportParts {
			sender: Box::new(WebSocketTransportSender { sink: self.sink }),
			receiver: Box::new(WebSocketTransportReceiver {
				stream: self.stream,
				message_tx: self.message_tx,
			}),
			message_rx,
		}
	}
}

/// Outbound half of [`WebSocketTransport`].
pub struct WebSocketTransportSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketTransportSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink
				.send(Message::Text(text.into()))
				.await
				.map_err(|e| Error::TransportError(format!("failed to send frame: {e}")))
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			match self.sink.close().await {
				Ok(()) => Ok(()),
				Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
				| Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
				Err(e) => Err(Error::TransportError(format!("failed to close: {e}"))),
			}
		})
	}
}

/// Inbound half of [`WebSocketTransport`].
pub struct WebSocketTransportReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let frame = frame.map_err(|e| Error::TransportError(format!("failed to read frame: {e}")))?;
				let value: Value = match frame {
					Message::Text(text) => serde_json::from_str(&text)?,
					Message::Binary(bytes) => serde_json::from_slice(&bytes)?,
					Message::Close(_) => return Ok(()),
					_ => continue,
				};
				if self.message_tx.send(value).is_err() {
					// Connection dropped its receiver; nobody is listening anymore.
					return Ok(());
				}
			}
			Ok(())
		})
	}
}
