use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;

struct FakeSession {
	target: SocketAddr,
	share_error: Option<String>,
	closed: CancellationToken,
	shared: Mutex<Vec<(u16, String)>>,
}

impl FakeSession {
	fn new(target: SocketAddr) -> Self {
		Self {
			target,
			share_error: None,
			closed: CancellationToken::new(),
			shared: Mutex::new(Vec::new()),
		}
	}
}

impl ForwardSession for FakeSession {
	fn share_port<'a>(&'a self, port: u16, name: &'a str) -> BoxFuture<'a, Result<SharedServer>> {
		Box::pin(async move {
			self.shared.lock().push((port, name.to_string()));
			if let Some(message) = &self.share_error {
				return Err(Error::Remote {
					message: message.clone(),
					code: None,
				});
			}
			Ok(SharedServer {
				stream_name: format!("stream-{port}"),
				stream_condition: "ready".to_string(),
			})
		})
	}

	fn open_stream<'a>(&'a self, _server: &'a SharedServer) -> BoxFuture<'a, Result<RemoteStream>> {
		Box::pin(async move {
			let stream = TcpStream::connect(self.target).await?;
			Ok(Box::new(stream) as RemoteStream)
		})
	}

	fn closed(&self) -> BoxFuture<'_, ()> {
		Box::pin(self.closed.cancelled())
	}
}

async fn echo_server() -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		while let Ok((mut stream, _)) = listener.accept().await {
			tokio::spawn(async move {
				let (mut reader, mut writer) = stream.split();
				let _ = tokio::io::copy(&mut reader, &mut writer).await;
			});
		}
	});
	addr
}

async fn local_listener() -> (TcpListener, SocketAddr) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	(listener, addr)
}

async fn round_trip(stream: &mut TcpStream, payload: &[u8]) {
	stream.write_all(payload).await.unwrap();
	let mut buf = vec![0u8; payload.len()];
	stream.read_exact(&mut buf).await.unwrap();
	assert_eq!(buf, payload);
}

fn spawn_forwarder(
	session: Arc<FakeSession>,
	single_connection: bool,
	cancel: CancellationToken,
	listener: TcpListener,
) -> tokio::task::JoinHandle<Error> {
	let forwarder = PortForwarder::new(session, "jupyter", 8888, single_connection);
	tokio::spawn(forwarder.forward_to_listener(cancel, listener))
}

async fn finish(handle: tokio::task::JoinHandle<Error>) -> Error {
	tokio::time::timeout(Duration::from_secs(5), handle)
		.await
		.expect("forwarder should stop")
		.unwrap()
}

#[tokio::test]
async fn single_connection_ends_with_connection_closed() {
	let session = Arc::new(FakeSession::new(echo_server().await));
	let (listener, addr) = local_listener().await;
	let handle = spawn_forwarder(Arc::clone(&session), true, CancellationToken::new(), listener);

	let mut client = TcpStream::connect(addr).await.unwrap();
	round_trip(&mut client, b"hello jupyter").await;
	drop(client);

	assert!(matches!(finish(handle).await, Error::ConnectionClosed));
	assert_eq!(session.shared.lock().as_slice(), &[(8888, "jupyter".to_string())]);
}

#[tokio::test]
async fn cancellation_stops_forwarding_and_closes_listener() {
	let session = Arc::new(FakeSession::new(echo_server().await));
	let (listener, addr) = local_listener().await;
	let cancel = CancellationToken::new();
	let handle = spawn_forwarder(session, true, cancel.clone(), listener);

	let mut client = TcpStream::connect(addr).await.unwrap();
	round_trip(&mut client, b"ping").await;

	cancel.cancel();
	assert!(matches!(finish(handle).await, Error::Cancelled));
	assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn cancelled_before_sharing() {
	let session = Arc::new(FakeSession::new(echo_server().await));
	let (listener, _) = local_listener().await;
	let cancel = CancellationToken::new();
	cancel.cancel();

	let handle = spawn_forwarder(Arc::clone(&session), true, cancel, listener);
	assert!(matches!(finish(handle).await, Error::Cancelled));
}

#[tokio::test]
async fn single_mode_rejects_second_client() {
	let session = Arc::new(FakeSession::new(echo_server().await));
	let (listener, addr) = local_listener().await;
	let cancel = CancellationToken::new();
	let handle = spawn_forwarder(session, true, cancel.clone(), listener);

	let mut first = TcpStream::connect(addr).await.unwrap();
	round_trip(&mut first, b"first").await;

	let mut second = TcpStream::connect(addr).await.unwrap();
	let mut buf = [0u8; 8];
	let read = tokio::time::timeout(Duration::from_secs(5), second.read(&mut buf))
		.await
		.expect("rejected client should see the socket close");
	assert!(!matches!(read, Ok(n) if n > 0));

	round_trip(&mut first, b"still here").await;
	cancel.cancel();
	assert!(matches!(finish(handle).await, Error::Cancelled));
}

#[tokio::test]
async fn multi_mode_serves_concurrent_clients() {
	let session = Arc::new(FakeSession::new(echo_server().await));
	let (listener, addr) = local_listener().await;
	let cancel = CancellationToken::new();
	let handle = spawn_forwarder(session, false, cancel.clone(), listener);

	let mut a = TcpStream::connect(addr).await.unwrap();
	let mut b = TcpStream::connect(addr).await.unwrap();
	round_trip(&mut a, b"from a").await;
	round_trip(&mut b, b"from b").await;
	drop(a);
	round_trip(&mut b, b"b again").await;

	cancel.cancel();
	assert!(matches!(finish(handle).await, Error::Cancelled));
}

#[tokio::test]
async fn session_close_stops_forwarding() {
	let session = Arc::new(FakeSession::new(echo_server().await));
	let (listener, _) = local_listener().await;
	let handle = spawn_forwarder(Arc::clone(&session), true, CancellationToken::new(), listener);

	session.closed.cancel();
	assert!(matches!(finish(handle).await, Error::SessionClosed));
}

#[tokio::test]
async fn share_failure_is_reported() {
	let mut session = FakeSession::new(echo_server().await);
	session.share_error = Some("port not available".to_string());
	let (listener, _) = local_listener().await;
	let handle = spawn_forwarder(Arc::new(session), true, CancellationToken::new(), listener);

	match finish(handle).await {
		Error::Remote { message, .. } => assert_eq!(message, "port not available"),
		other => panic!("expected remote error, got {other:?}"),
	}
}

#[tokio::test]
async fn stream_failure_ends_single_connection_tunnel() {
	let (closed, target) = local_listener().await;
	drop(closed);
	let session = Arc::new(FakeSession::new(target));
	let (listener, addr) = local_listener().await;
	let handle = spawn_forwarder(session, true, CancellationToken::new(), listener);

	let _client = TcpStream::connect(addr).await.unwrap();
	assert!(matches!(finish(handle).await, Error::Io(_)));
}
