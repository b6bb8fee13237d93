//! Wire types for codespace sessions.
//!
//! This crate contains the serde-serializable types exchanged with the
//! codespaces REST API and with a codespace's session control channel. These
//! types represent the "protocol layer" - the shapes of data as they appear
//! on the wire.
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization and small accessors
//! - **Stable**: Changes only when the wire format changes
//!
//! Session handling lives in `cs-runtime`; the command line in `cs-cli`.

pub mod codespace;
pub mod rpc;
pub mod services;

pub use codespace::*;
pub use rpc::*;
pub use services::*;
