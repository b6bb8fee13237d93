//! Local port forwarding over a session.
//!
//! A [`PortForwarder`] shares one remote port through a [`ForwardSession`],
//! accepts connections on a local [`TcpListener`], and copies bytes between
//! each accepted socket and a freshly opened remote stream.
//!
//! [`PortForwarder::forward_to_listener`] never returns success: it always
//! reports the reason forwarding stopped, including cancellation.

#[cfg(test)]
mod tests;

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use cs_protocol::SharedServer;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Boxed future returned by [`ForwardSession`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Byte stream usable as the remote end of a forwarded connection.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Remote end of one forwarded connection.
pub type RemoteStream = Box<dyn AsyncStream>;

/// Session capabilities the forwarder relies on.
pub trait ForwardSession: Send + Sync {
	/// Makes `port` on the remote host reachable through the session.
	fn share_port<'a>(&'a self, port: u16, name: &'a str) -> BoxFuture<'a, Result<SharedServer>>;

	/// Opens a new byte stream to a previously shared port.
	fn open_stream<'a>(&'a self, server: &'a SharedServer) -> BoxFuture<'a, Result<RemoteStream>>;

	/// Resolves once the session has closed.
	fn closed(&self) -> BoxFuture<'_, ()>;
}

/// Forwards a local listener to one remote port.
pub struct PortForwarder<S: ?Sized> {
	session: Arc<S>,
	name: String,
	remote_port: u16,
	single_connection: bool,
}

impl<S: ForwardSession + ?Sized + 'static> PortForwarder<S> {
	/// Creates a forwarder for `remote_port`, labelled `name` on the remote side.
	///
	/// In single-connection mode only the first accepted connection is served;
	/// later ones are closed immediately, and forwarding stops once the first
	/// connection ends.
	pub fn new(session: Arc<S>, name: impl Into<String>, remote_port: u16, single_connection: bool) -> Self {
		Self {
			session,
			name: name.into(),
			remote_port,
			single_connection,
		}
	}

	/// Accepts connections on `listener` until forwarding stops, returning why.
	///
	/// The listener is dropped (closed) before this returns, and any connection
	/// still being served is aborted.
	pub async fn forward_to_listener(self, cancel: CancellationToken, listener: TcpListener) -> Error {
		let shared = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Error::Cancelled,
			result = self.session.share_port(self.remote_port, &self.name) => match result {
				Ok(shared) => Arc::new(shared),
				Err(e) => return e,
			},
		};
		info!(
			port = self.remote_port,
			name = %self.name,
			stream = %shared.stream_name,
			"sharing remote port"
		);

		let (done_tx, mut done_rx) = mpsc::channel::<Error>(1);
		let mut handlers = JoinSet::new();
		let session_closed = self.session.closed();
		tokio::pin!(session_closed);
		let mut serving = false;

		let reason = loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break Error::Cancelled,
				_ = &mut session_closed => break Error::SessionClosed,
				Some(reason) = done_rx.recv() => break reason,
				Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
				accepted = listener.accept() => {
					let (socket, peer) = match accepted {
						Ok(accepted) => accepted,
						Err(e) => break Error::Io(e),
					};
					if self.single_connection && serving {
						debug!(%peer, "rejecting connection: tunnel already has a client");
						drop(socket);
						continue;
					}
					serving = true;

					let session = Arc::clone(&self.session);
					let shared = Arc::clone(&shared);
					let done_tx = done_tx.clone();
					let single_connection = self.single_connection;
					handlers.spawn(async move {
						match serve_connection(session.as_ref(), &shared, socket, peer).await {
							Ok(()) if single_connection => {
								let _ = done_tx.try_send(Error::ConnectionClosed);
							}
							Ok(()) => {}
							Err(e) if single_connection => {
								let _ = done_tx.try_send(e);
							}
							Err(e) => warn!(%peer, error = %e, "forwarded connection failed"),
						}
					});
				}
			}
		};

		handlers.abort_all();
		drop(listener);
		if reason.is_cancelled() {
			debug!("port forwarding cancelled");
		} else {
			info!(reason = %reason, "port forwarding stopped");
		}
		reason
	}
}

async fn serve_connection<S: ForwardSession + ?Sized>(
	session: &S,
	shared: &SharedServer,
	mut socket: TcpStream,
	peer: SocketAddr,
) -> Result<()> {
	debug!(%peer, "accepted local connection");
	let mut remote = session.open_stream(shared).await?;
	let (up, down) = tokio::io::copy_bidirectional(&mut socket, &mut remote)
		.await
		.map_err(Error::Tunnel)?;
	debug!(%peer, bytes_up = up, bytes_down = down, "local connection closed");
	Ok(())
}
