//! A live session with a codespace.
//!
//! [`Session`] owns the control-channel [`Connection`] and the task driving
//! it. Data for forwarded ports does not travel over the control channel:
//! every forwarded connection gets its own WebSocket stream on the relay,
//! bridged to an in-memory duplex pipe so callers see plain bytes.


use std::sync::Arc;

use cs_protocol::{
	ConnectionDetails, GET_STREAM, GetStreamRequest, JUPYTER_GET_RUNNING_SERVER, JupyterServerInfo, START_SHARING,
	SharePortRequest, SharedServer, StreamInfo,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::forward::{BoxFuture, ForwardSession, RemoteStream};
use crate::logger::SessionLogger;
use crate::transport::{TransportParts, WebSocketTransport, WsStream, connect_websocket};

/// Capacity of the in-memory pipe behind each remote stream.
const STREAM_BUFFER: usize = 64 * 1024;
/// Largest chunk sent in a single binary frame.
const FRAME_SIZE: usize = 16 * 1024;

/// Protocol label used when sharing a port.
const SHARE_PROTOCOL: &str = "http";

pub struct Session {
	connection: Arc<Connection>,
	relay: Url,
	token: String,
	logger: SessionLogger,
	run_task: Mutex<Option<JoinHandle<Result<()>>>>,
	/// Pumps for open data streams; stopped by [`Session::close`].
	streams: Mutex<JoinSet<()>>,
	streams_cancel: CancellationToken,
}

impl Session {
	/// Connects to the session described by `details`.
	///
	/// The control channel lives at `<relay>/sessions/<session id>`.
	pub async fn connect(details: &ConnectionDetails, logger: SessionLogger) -> Result<Self> {
		let relay = relay_url(&details.relay_endpoint)?;
		let url = endpoint_url(&relay, &["sessions", &details.session_id])?;

		debug!(url = %url, "connecting to session");
		logger.log(&format!("connecting to {url}"));
		let (transport, message_rx) = WebSocketTransport::connect(url.as_str(), Some(&details.session_token)).await?;
		logger.log("session connected");

		Ok(Self::start(
			transport.into_transport_parts(message_rx),
			relay,
			details.session_token.clone(),
			logger,
		))
	}

	fn start(parts: TransportParts, relay: Url, token: String, logger: SessionLogger) -> Self {
		let connection = Arc::new(Connection::new(parts, Arc::clone(&logger)));
		let runner = Arc::clone(&connection);
		let run_task = tokio::spawn(async move { runner.run().await });

		Self {
			connection,
			relay,
			token,
			logger,
			run_task: Mutex::new(Some(run_task)),
			streams: Mutex::new(JoinSet::new()),
			streams_cancel: CancellationToken::new(),
		}
	}

	/// Asks the codespace for its running JupyterLab server.
	///
	/// Returns the server's port inside the codespace and the URL it advertises.
	pub async fn start_jupyter_server(&self) -> Result<(u16, String)> {
		let value = self.connection.send_message(JUPYTER_GET_RUNNING_SERVER, json!([])).await?;
		let info: JupyterServerInfo = serde_json::from_value(value)?;

		if !info.result {
			return Err(Error::JupyterUnavailable(info.message));
		}

		let port = info.port.parse::<u16>().map_err(|source| Error::InvalidPort {
			value: info.port.clone(),
			source,
		})?;
		Ok((port, info.server_url))
	}

	/// Shares `port` inside the codespace so streams can be opened to it.
	pub async fn share_port(&self, port: u16, name: &str) -> Result<SharedServer> {
		let request = SharePortRequest {
			port,
			name: name.to_string(),
			protocol: SHARE_PROTOCOL.to_string(),
		};
		let value = self
			.connection
			.send_message(START_SHARING, serde_json::to_value(&request)?)
			.await?;
		Ok(serde_json::from_value(value)?)
	}

	/// Opens a data stream to a shared port.
	pub async fn open_stream(&self, server: &SharedServer) -> Result<RemoteStream> {
		let request = GetStreamRequest {
			stream_name: server.stream_name.clone(),
			condition: server.stream_condition.clone(),
		};
		let value = self
			.connection
			.send_message(GET_STREAM, serde_json::to_value(&request)?)
			.await?;
		let info: StreamInfo = serde_json::from_value(value)?;

		let url = endpoint_url(&self.relay, &["streams", &info.stream_id])?;
		let ws = connect_websocket(url.as_str(), Some(&self.token)).await?;
		self.logger.log(&format!("stream {} opened", info.stream_id));

		let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
		let pump = pump_stream(
			ws,
			remote,
			info.stream_id,
			Arc::clone(&self.logger),
			self.streams_cancel.child_token(),
		);
		let mut streams = self.streams.lock();
		while streams.try_join_next().is_some() {}
		streams.spawn(pump);
		Ok(Box::new(local))
	}

	/// Resolves once the session has closed, locally or remotely.
	pub async fn closed(&self) {
		self.connection.closed().await;
	}

	pub fn is_closed(&self) -> bool {
		self.connection.is_closed()
	}

	/// Closes the control channel and every open data stream, then waits for
	/// their tasks to finish.
	///
	/// Calling this more than once is harmless.
	pub async fn close(&self) -> Result<()> {
		self.streams_cancel.cancel();
		let mut streams = std::mem::take(&mut *self.streams.lock());
		while let Some(joined) = streams.join_next().await {
			if let Err(e) = joined {
				warn!(error = %e, "data stream task failed");
			}
		}

		self.connection.shutdown();
		let run_task = self.run_task.lock().take();
		match run_task {
			Some(handle) => handle
				.await
				.map_err(|e| Error::ProtocolError(format!("session task failed: {e}")))?,
			None => Ok(()),
		}
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.streams_cancel.cancel();
		self.connection.shutdown();
	}
}

impl ForwardSession for Session {
	fn share_port<'a>(&'a self, port: u16, name: &'a str) -> BoxFuture<'a, Result<SharedServer>> {
		Box::pin(Session::share_port(self, port, name))
	}

	fn open_stream<'a>(&'a self, server: &'a SharedServer) -> BoxFuture<'a, Result<RemoteStream>> {
		Box::pin(Session::open_stream(self, server))
	}

	fn closed(&self) -> BoxFuture<'_, ()> {
		Box::pin(Session::closed(self))
	}
}

/// Parses the relay endpoint, mapping `http(s)` onto `ws(s)`.
fn relay_url(endpoint: &str) -> Result<Url> {
	let invalid = |reason: String| Error::InvalidEndpoint {
		endpoint: endpoint.to_string(),
		reason,
	};

	let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
	let scheme = match url.scheme() {
		"ws" | "wss" => return Ok(url),
		"http" => "ws",
		"https" => "wss",
		other => return Err(invalid(format!("unsupported scheme {other:?}"))),
	};
	url.set_scheme(scheme)
		.map_err(|()| invalid(format!("cannot switch to {scheme}")))?;
	Ok(url)
}

/// Appends `segments` to the relay path.
fn endpoint_url(relay: &Url, segments: &[&str]) -> Result<Url> {
	let mut url = relay.clone();
	url.path_segments_mut()
		.map_err(|()| Error::InvalidEndpoint {
			endpoint: relay.to_string(),
			reason: "relay URL cannot carry a path".to_string(),
		})?
		.pop_if_empty()
		.extend(segments);
	Ok(url)
}

/// Copies bytes between a data-stream WebSocket and the session side of a duplex pipe.
///
/// Local EOF sends a close frame; the pipe is shut down once the relay closes.
/// Cancelling drops the socket without waiting for the relay.
async fn pump_stream(
	ws: WsStream,
	mut pipe: DuplexStream,
	stream_id: String,
	logger: SessionLogger,
	cancel: CancellationToken,
) {
	let (mut sink, mut frames) = ws.split();
	let mut buf = vec![0u8; FRAME_SIZE];
	let mut upstream_open = true;

	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				debug!(stream = %stream_id, "data stream cancelled");
				break;
			}
			read = pipe.read(&mut buf), if upstream_open => match read {
				Ok(0) => {
					upstream_open = false;
					if let Err(e) = sink.close().await {
						debug!(stream = %stream_id, error = %e, "closing data stream");
					}
				}
				Ok(n) => {
					if let Err(e) = sink.send(Message::Binary(buf[..n].to_vec())).await {
						warn!(stream = %stream_id, error = %e, "data stream write failed");
						break;
					}
				}
				Err(e) => {
					debug!(stream = %stream_id, error = %e, "local pipe read failed");
					break;
				}
			},
			frame = frames.next() => match frame {
				Some(Ok(Message::Binary(data))) => {
					if pipe.write_all(&data).await.is_err() {
						break;
					}
				}
				Some(Ok(Message::Text(text))) => {
					if pipe.write_all(text.as_bytes()).await.is_err() {
						break;
					}
				}
				Some(Ok(Message::Close(_))) | None => {
					let _ = pipe.shutdown().await;
					break;
				}
				Some(Ok(_)) => {}
				Some(Err(e)) => {
					warn!(stream = %stream_id, error = %e, "data stream read failed");
					break;
				}
			},
		}
	}

	logger.log(&format!("stream {stream_id} closed"));
}
