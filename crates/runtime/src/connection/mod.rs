//! JSON-RPC connection over the session control channel
//!
//! This module implements the request/response correlation layer on top of the transport.
//! It handles:
//! - Generating unique request IDs
//! - Correlating responses with pending requests
//! - Distinguishing events from responses
//! - Tracking whether the session is still alive
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send_message`] with a method and params
//! 2. Connection generates a unique ID and registers a oneshot channel
//! 3. Request is queued for the writer task and sent via transport
//! 4. Message loop receives the response from the transport
//! 5. Response is correlated by ID and delivered through the oneshot channel
//!
//! When the transport ends or the host announces termination, the connection
//! is marked closed and every pending request fails with [`Error::SessionClosed`].


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};

use cs_protocol::{ErrorPayload, Message, Request, SESSION_TERMINATED};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::logger::SessionLogger;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Pending request callbacks keyed by request ID.
type CallbackMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// RAII guard removing the callback when a request future is dropped early.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if !self.completed && self.callbacks.lock().remove(&self.id).is_some() {
			tracing::debug!(id = self.id, "removed orphaned callback");
		}
	}
}

/// Future returned by [`Connection::send_message`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.completed = true;
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Pieces consumed by the first call to [`Connection::run`].
struct RunParts {
	sender: Box<dyn Transport>,
	receiver: Box<dyn TransportReceiver>,
	message_rx: mpsc::UnboundedReceiver<Value>,
	outbound_rx: mpsc::UnboundedReceiver<Value>,
}

/// JSON-RPC connection to a session host
///
/// Uses sequential request IDs and oneshot channels for correlation.
pub struct Connection {
	last_id: AtomicU32,
	callbacks: CallbackMap,
	/// Channel for sending outbound messages to the writer task
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Transport pieces, taken by `run()`
	parts: Mutex<Option<RunParts>>,
	/// Flips to true once the session is gone
	closed_tx: watch::Sender<bool>,
	/// Stops the run loop and closes the transport
	shutdown: CancellationToken,
	logger: SessionLogger,
}

impl Connection {
	/// Create a new Connection with the given transport
	pub fn new(parts: TransportParts, logger: SessionLogger) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (closed_tx, _) = watch::channel(false);

		Self {
			last_id: AtomicU32::new(0),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			outbound_tx,
			parts: Mutex::new(Some(RunParts {
				sender,
				receiver,
				message_rx,
				outbound_rx,
			})),
			closed_tx,
			shutdown: CancellationToken::new(),
			logger,
		}
	}

	/// Sends a request and awaits the correlated response.
	pub async fn send_message(&self, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::SessionClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);
		let guard = CancelGuard {
			id,
			callbacks: Arc::clone(&self.callbacks),
			completed: false,
		};

		// Closing drains callbacks after flipping the flag; re-check so a
		// request registered during that window cannot wait forever.
		if self.is_closed() {
			return Err(Error::SessionClosed);
		}

		let request = Request {
			id,
			method: method.to_string(),
			params,
		};
		let request_value = serde_json::to_value(&request)?;
		tracing::debug!(id, method, "sending request");
		self.logger.log(&format!("-> #{id} {method} {}", request.params));

		if self.outbound_tx.send(request_value).is_err() {
			tracing::error!("failed to queue message: outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		ResponseFuture { rx, guard }.await
	}

	/// Runs the reader, writer, and dispatch loop until the session ends.
	///
	/// Returns once the transport has ended, the host announced termination,
	/// or [`Connection::shutdown`] was called.
	pub async fn run(self: &Arc<Self>) -> Result<()> {
		let RunParts {
			mut sender,
			receiver,
			mut message_rx,
			mut outbound_rx,
		} = self
			.parts
			.lock()
			.take()
			.ok_or_else(|| Error::ProtocolError("connection is already running".to_string()))?;

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::warn!(error = %e, "transport read error");
			}
		});

		let shutdown = self.shutdown.clone();
		let writer_handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = shutdown.cancelled() => break,
					message = outbound_rx.recv() => match message {
						Some(message) => {
							if let Err(e) = sender.send(message).await {
								tracing::error!(error = %e, "transport write error");
								break;
							}
						}
						None => break,
					},
				}
			}
			if let Err(e) = sender.close().await {
				tracing::debug!(error = %e, "transport close error");
			}
		});

		loop {
			tokio::select! {
				_ = self.shutdown.cancelled() => break,
				message = message_rx.recv() => match message {
					Some(value) => match serde_json::from_value::<Message>(value) {
						Ok(message) => {
							if let Err(e) = self.dispatch_internal(message) {
								tracing::warn!(error = %e, "error dispatching message");
							}
						}
						Err(e) => tracing::warn!(error = %e, "failed to parse message"),
					},
					None => break,
				},
			}
		}

		self.mark_closed("control channel ended");
		let _ = writer_handle.await;
		reader_handle.abort();
		let _ = reader_handle.await;
		Ok(())
	}

	/// Requests the run loop to stop and the transport to close.
	pub fn shutdown(&self) {
		self.mark_closed("closed locally");
	}

	pub fn is_closed(&self) -> bool {
		*self.closed_tx.borrow()
	}

	/// Resolves once the session is closed (immediately if it already is).
	pub async fn closed(&self) {
		let mut rx = self.closed_tx.subscribe();
		let _ = rx.wait_for(|closed| *closed).await;
	}

	/// Dispatch an incoming message (test-only public version)
	#[cfg(test)]
	pub(crate) fn dispatch(&self, message: Message) -> Result<()> {
		self.dispatch_internal(message)
	}

	fn dispatch_internal(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let callback = self.callbacks.lock().remove(&response.id).ok_or_else(|| {
					Error::ProtocolError(format!("cannot find request to respond: id={}", response.id))
				})?;

				let result = match response.error {
					Some(error) => {
						self.logger.log(&format!("<- #{} error: {}", response.id, error.message));
						Err(remote_error(error))
					}
					None => {
						let value = response.result.unwrap_or(Value::Null);
						self.logger.log(&format!("<- #{} {value}", response.id));
						Ok(value)
					}
				};

				let _ = callback.send(result);
				Ok(())
			}
			Message::Event(event) => {
				self.logger.log(&format!("<- event {} {}", event.method, event.params));
				if event.method == SESSION_TERMINATED {
					tracing::info!(params = %event.params, "session terminated by host");
					self.mark_closed("terminated by host");
				} else {
					tracing::debug!(method = %event.method, "ignoring session event");
				}
				Ok(())
			}
			Message::Unknown(value) => {
				tracing::debug!(message = %value, "unknown message type (ignored)");
				Ok(())
			}
		}
	}

	fn mark_closed(&self, reason: &str) {
		let newly_closed = self.closed_tx.send_if_modified(|closed| !std::mem::replace(closed, true));
		self.shutdown.cancel();
		if !newly_closed {
			return;
		}

		tracing::debug!(reason, "session connection closed");
		self.logger.log(&format!("session closed: {reason}"));
		let pending: Vec<_> = self.callbacks.lock().drain().collect();
		for (_, callback) in pending {
			let _ = callback.send(Err(Error::SessionClosed));
		}
	}
}

/// Converts a remote [`ErrorPayload`] into [`Error::Remote`].
fn remote_error(error: ErrorPayload) -> Error {
	Error::Remote {
		message: error.message,
		code: error.code,
	}
}
