//! In-memory transport for unit testing the connection and session layers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Transport, TransportParts, TransportReceiver};
use crate::error::Result;

/// Builds a fake transport and the controller driving it.
pub(crate) fn fake_transport() -> (TransportParts, FakeController) {
	let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
	let (message_tx, message_rx) = mpsc::unbounded_channel();
	let (sent_tx, sent_rx) = mpsc::unbounded_channel();
	let closed = Arc::new(Mutex::new(false));

	let parts = TransportParts {
		sender: Box::new(FakeSender {
			sent: sent_tx,
			closed: Arc::clone(&closed),
		}),
		receiver: Box::new(FakeReceiver { inbound_rx, message_tx }),
		message_rx,
	};

	let controller = FakeController {
		inbound_tx: Some(inbound_tx),
		sent_rx,
		closed,
	};
	(parts, controller)
}

/// Test-side handle: inject inbound messages, observe outbound ones.
pub(crate) struct FakeController {
	inbound_tx: Option<mpsc::UnboundedSender<Value>>,
	sent_rx: mpsc::UnboundedReceiver<Value>,
	closed: Arc<Mutex<bool>>,
}

impl FakeController {
	pub(crate) fn inject(&self, message: Value) {
		if let Some(tx) = &self.inbound_tx {
			let _ = tx.send(message);
		}
	}

	pub(crate) fn inject_response(&self, id: u64, result: Value) {
		self.inject(serde_json::json!({ "id": id, "result": result }));
	}

	pub(crate) fn inject_error(&self, id: u64, message: &str) {
		self.inject(serde_json::json!({ "id": id, "error": { "message": message } }));
	}

	/// Waits for the next message the connection wrote.
	pub(crate) async fn next_sent(&mut self) -> Value {
		self.sent_rx.recv().await.expect("connection writer stopped")
	}

	/// Simulates the remote side hanging up.
	pub(crate) fn hang_up(&mut self) {
		self.inbound_tx = None;
	}

	pub(crate) fn was_closed(&self) -> bool {
		*self.closed.lock()
	}
}

struct FakeSender {
	sent: mpsc::UnboundedSender<Value>,
	closed: Arc<Mutex<bool>>,
}

impl Transport for FakeSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let _ = self.sent.send(message);
		Box::pin(async { Ok(()) })
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		*self.closed.lock() = true;
		Box::pin(async { Ok(()) })
	}
}

struct FakeReceiver {
	inbound_rx: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for FakeReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
