//! End-to-end session tests against an in-process relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cs_protocol::{ConnectionDetails, GET_STREAM, JUPYTER_GET_RUNNING_SERVER, SESSION_TERMINATED, START_SHARING};
use cs_runtime::{Error, PortForwarder, Session, noop_logger};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "session-token";
const JUPYTER_PORT: u16 = 8888;

/// How the relay treats data streams.
#[derive(Clone, Copy)]
enum Streams {
	Echo,
	/// Reads raw bytes and never answers, not even a close frame.
	Hold,
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
	Opened,
	/// First bytes arrived on a held stream.
	Received,
	/// The client dropped the socket.
	Released,
}

struct Relay {
	addr: SocketAddr,
	/// Cancelling makes every control channel announce termination.
	terminate: CancellationToken,
	events: mpsc::UnboundedReceiver<StreamEvent>,
}

impl Relay {
	async fn start() -> Self {
		Self::start_with(Streams::Echo).await
	}

	async fn start_with(streams: Streams) -> Self {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let terminate = CancellationToken::new();
		let shutdown = terminate.clone();
		let (events_tx, events) = mpsc::unbounded_channel();

		tokio::spawn(async move {
			while let Ok((stream, _)) = listener.accept().await {
				tokio::spawn(serve(stream, shutdown.clone(), streams, events_tx.clone()));
			}
		});
		Self { addr, terminate, events }
	}

	async fn next_event(&mut self) -> StreamEvent {
		tokio::time::timeout(Duration::from_secs(5), self.events.recv())
			.await
			.expect("relay should see a stream event")
			.unwrap()
	}

	fn details(&self) -> ConnectionDetails {
		ConnectionDetails {
			session_id: "session-1".to_string(),
			session_token: TOKEN.to_string(),
			relay_endpoint: format!("http://{}", self.addr),
		}
	}
}

async fn serve(
	stream: TcpStream,
	terminate: CancellationToken,
	streams: Streams,
	events: mpsc::UnboundedSender<StreamEvent>,
) {
	let mut path = String::new();
	let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
		path = request.uri().path().to_string();
		let authorized = request
			.headers()
			.get("authorization")
			.and_then(|value| value.to_str().ok())
			== Some(format!("Bearer {TOKEN}").as_str());
		if authorized {
			Ok(response)
		} else {
			let mut denied = ErrorResponse::new(None);
			*denied.status_mut() = StatusCode::UNAUTHORIZED;
			Err(denied)
		}
	};
	let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
		return;
	};

	if path == "/sessions/session-1" {
		control(ws, terminate).await;
	} else if path.starts_with("/streams/") {
		let _ = events.send(StreamEvent::Opened);
		match streams {
			Streams::Echo => echo(ws).await,
			Streams::Hold => hold(ws, &events).await,
		}
		let _ = events.send(StreamEvent::Released);
	}
}

async fn control(ws: tokio_tungstenite::WebSocketStream<TcpStream>, terminate: CancellationToken) {
	let (mut sink, mut frames) = ws.split();
	let mut next_stream = 0;

	loop {
		let frame = tokio::select! {
			_ = terminate.cancelled() => {
				let event = json!({"method": SESSION_TERMINATED, "params": {"reason": "shutdown"}});
				let _ = sink.send(Message::Text(event.to_string())).await;
				return;
			}
			frame = frames.next() => frame,
		};
		let Some(Ok(Message::Text(text))) = frame else {
			return;
		};

		let request: Value = serde_json::from_str(&text).unwrap();
		let result = match request["method"].as_str().unwrap_or_default() {
			JUPYTER_GET_RUNNING_SERVER => json!({
				"result": true,
				"message": "",
				"port": JUPYTER_PORT.to_string(),
				"serverUrl": format!("http://localhost:{JUPYTER_PORT}/lab?token=abc123"),
			}),
			START_SHARING => json!({
				"streamName": format!("{}-{}", request["params"]["name"].as_str().unwrap_or_default(), request["params"]["port"]),
				"streamCondition": "ready",
			}),
			GET_STREAM => {
				next_stream += 1;
				json!({"streamId": format!("stream-{next_stream}")})
			}
			_ => {
				let error = json!({"id": request["id"], "error": {"message": "unknown method"}});
				let _ = sink.send(Message::Text(error.to_string())).await;
				continue;
			}
		};
		let response = json!({"id": request["id"], "result": result});
		if sink.send(Message::Text(response.to_string())).await.is_err() {
			return;
		}
	}
}

async fn echo(mut ws: tokio_tungstenite::WebSocketStream<TcpStream>) {
	while let Some(Ok(frame)) = ws.next().await {
		match frame {
			Message::Binary(data) => {
				if ws.send(Message::Binary(data)).await.is_err() {
					return;
				}
			}
			Message::Close(_) => return,
			_ => {}
		}
	}
}

async fn hold(mut ws: tokio_tungstenite::WebSocketStream<TcpStream>, events: &mpsc::UnboundedSender<StreamEvent>) {
	let mut buf = [0u8; 1024];
	let mut received = false;
	while let Ok(n) = ws.get_mut().read(&mut buf).await {
		if n == 0 {
			return;
		}
		if !received {
			received = true;
			let _ = events.send(StreamEvent::Received);
		}
	}
}

async fn round_trip(stream: &mut TcpStream, payload: &[u8]) {
	stream.write_all(payload).await.unwrap();
	let mut buf = vec![0u8; payload.len()];
	stream.read_exact(&mut buf).await.unwrap();
	assert_eq!(buf, payload);
}

#[tokio::test]
async fn forwards_jupyter_through_relay() {
	let relay = Relay::start().await;
	let session = Arc::new(Session::connect(&relay.details(), noop_logger()).await.unwrap());

	let (port, url) = session.start_jupyter_server().await.unwrap();
	assert_eq!(port, JUPYTER_PORT);
	assert_eq!(url, "http://localhost:8888/lab?token=abc123");

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let local = listener.local_addr().unwrap();
	let forwarder = PortForwarder::new(Arc::clone(&session), "jupyter", port, true);
	let tunnel = tokio::spawn(forwarder.forward_to_listener(CancellationToken::new(), listener));

	let mut client = TcpStream::connect(local).await.unwrap();
	round_trip(&mut client, b"GET /lab HTTP/1.1\r\n\r\n").await;
	round_trip(&mut client, &[7u8; 40 * 1024]).await;
	drop(client);

	let reason = tokio::time::timeout(Duration::from_secs(5), tunnel).await.unwrap().unwrap();
	assert!(matches!(reason, Error::ConnectionClosed), "unexpected reason: {reason}");

	session.close().await.unwrap();
	assert!(session.is_closed());
}

#[tokio::test]
async fn host_termination_stops_tunnel() {
	let relay = Relay::start().await;
	let session = Arc::new(Session::connect(&relay.details(), noop_logger()).await.unwrap());

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let forwarder = PortForwarder::new(Arc::clone(&session), "jupyter", JUPYTER_PORT, true);
	let tunnel = tokio::spawn(forwarder.forward_to_listener(CancellationToken::new(), listener));

	// Let the port get shared before the host goes away.
	tokio::time::sleep(Duration::from_millis(50)).await;
	relay.terminate.cancel();

	let reason = tokio::time::timeout(Duration::from_secs(5), tunnel).await.unwrap().unwrap();
	assert!(matches!(reason, Error::SessionClosed), "unexpected reason: {reason}");
	session.close().await.unwrap();
}

#[tokio::test]
async fn closing_session_releases_open_streams() {
	let mut relay = Relay::start_with(Streams::Hold).await;
	let session = Arc::new(Session::connect(&relay.details(), noop_logger()).await.unwrap());

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let local = listener.local_addr().unwrap();
	let cancel = CancellationToken::new();
	let forwarder = PortForwarder::new(Arc::clone(&session), "jupyter", JUPYTER_PORT, true);
	let tunnel = tokio::spawn(forwarder.forward_to_listener(cancel.clone(), listener));

	let mut client = TcpStream::connect(local).await.unwrap();
	client.write_all(b"hello\n").await.unwrap();
	assert_eq!(relay.next_event().await, StreamEvent::Opened);
	assert_eq!(relay.next_event().await, StreamEvent::Received);

	cancel.cancel();
	let reason = tokio::time::timeout(Duration::from_secs(5), tunnel).await.unwrap().unwrap();
	assert!(matches!(reason, Error::Cancelled), "unexpected reason: {reason}");

	session.close().await.unwrap();
	assert_eq!(relay.next_event().await, StreamEvent::Released);
}

#[tokio::test]
async fn wrong_token_is_rejected() {
	let relay = Relay::start().await;
	let mut details = relay.details();
	details.session_token = "wrong".to_string();

	let err = match Session::connect(&details, noop_logger()).await {
		Ok(_) => panic!("connection with a bad token should fail"),
		Err(err) => err,
	};
	assert!(matches!(err, Error::ConnectionFailed(_)));
}
