//! Collaborators the commands depend on.
//!
//! Commands see the outside world only through these traits, so tests can
//! drive them with in-memory fakes. [`App::live`] wires up the real
//! implementations.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use cs_protocol::Codespace;
use cs_runtime::{ForwardSession, SessionLogger};
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::authkeys::AuthorizedKeysChecker;
use crate::browser::SystemBrowser;
use crate::codespace::ApiResolver;
use crate::config::Config;
use crate::connector::LiveSessionConnector;
use crate::error::Result;
use crate::progress::StderrProgress;

/// Where forwarded services listen locally; the OS picks the port.
pub const LOCAL_LISTEN_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

/// Finds the codespace a command should act on.
#[async_trait]
pub trait EnvironmentResolver: Send + Sync {
	/// Resolves `name`, or picks one when no name is given.
	async fn resolve(&self, name: Option<&str>) -> anyhow::Result<Codespace>;
}

/// Verifies the user can authenticate to a codespace.
#[async_trait]
pub trait CredentialChecker: Send + Sync {
	async fn check(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Opens sessions to codespaces.
#[async_trait]
pub trait SessionConnector: Send + Sync {
	async fn connect(
		&self,
		cancel: CancellationToken,
		codespace: &Codespace,
		logger: SessionLogger,
	) -> anyhow::Result<Arc<dyn RemoteSession>>;
}

/// A live session as seen by commands.
#[async_trait]
pub trait RemoteSession: ForwardSession {
	/// Returns the port `service` listens on inside the codespace, and the URL
	/// it advertises.
	async fn discover_service_port(&self, service: &str) -> cs_runtime::Result<(u16, String)>;

	/// Closes the session. Safe to call more than once.
	async fn close(&self) -> cs_runtime::Result<()>;
}

/// Hands a URL to a local application.
#[async_trait]
pub trait Opener: Send + Sync {
	async fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Tells the user which slow stage a command is in.
pub trait Progress: Send + Sync {
	fn stage(&self, label: &str);
}

/// Collaborators for one command invocation.
#[derive(Clone)]
pub struct App {
	pub resolver: Arc<dyn EnvironmentResolver>,
	pub credentials: Arc<dyn CredentialChecker>,
	pub connector: Arc<dyn SessionConnector>,
	pub opener: Arc<dyn Opener>,
	pub progress: Arc<dyn Progress>,
	/// Address the local end of a tunnel binds to.
	pub listen_addr: SocketAddr,
}

impl App {
	/// Real collaborators talking to the API described by `config`.
	pub fn live(config: &Config) -> Result<Self> {
		let api = Arc::new(ApiClient::new(config)?);
		let progress: Arc<dyn Progress> = Arc::new(StderrProgress);
		Ok(Self {
			resolver: Arc::new(ApiResolver::new(Arc::clone(&api))),
			credentials: Arc::new(AuthorizedKeysChecker::new(Arc::clone(&api))),
			connector: Arc::new(
				LiveSessionConnector::new(api, config.start_timeout).with_progress(Arc::clone(&progress)),
			),
			opener: Arc::new(SystemBrowser),
			progress,
			listen_addr: LOCAL_LISTEN_ADDR,
		})
	}
}
