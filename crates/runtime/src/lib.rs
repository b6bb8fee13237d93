//! Codespace runtime - session transport, connection, and port forwarding
//!
//! This crate provides the infrastructure for talking to a codespace session
//! host and tunnelling traffic through it:
//!
//! - **Transport**: WebSocket framing of JSON control messages
//! - **Connection**: JSON-RPC request/response correlation and event handling
//! - **Session**: service discovery, port sharing, and data streams
//! - **Forwarding**: moving bytes between a local listener and a shared port
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  PortForward │  local listener <-> remote stream
//! └──────┬───────┘
//!        │ ForwardSession
//! ┌──────▼───────┐
//! │   Session    │  discovery, sharing, streams
//! │  ┌────────┐  │
//! │  │ Conn   │  │  JSON-RPC correlation
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket transport
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod forward;
pub mod logger;
pub mod session;
pub mod transport;

pub use connection::Connection;
pub use error::{Error, Result};
pub use forward::{AsyncStream, ForwardSession, PortForwarder, RemoteStream};
pub use logger::{NoopLog, SessionLog, SessionLogger, noop_logger};
pub use session::Session;
pub use transport::{Transport, TransportParts, TransportReceiver, WebSocketTransport};
