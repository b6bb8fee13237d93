//! Opening sessions to codespaces, starting them first when needed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use cs_protocol::{Codespace, JUPYTER_SERVICE};
use cs_runtime::{Session, SessionLogger};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::app::{Progress, RemoteSession, SessionConnector};
use crate::progress::StderrProgress;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Connects through the REST API and the session relay.
pub struct LiveSessionConnector {
	api: Arc<ApiClient>,
	start_timeout: Duration,
	poll_interval: Duration,
	progress: Arc<dyn Progress>,
}

impl LiveSessionConnector {
	pub fn new(api: Arc<ApiClient>, start_timeout: Duration) -> Self {
		Self {
			api,
			start_timeout,
			poll_interval: POLL_INTERVAL,
			progress: Arc::new(StderrProgress),
		}
	}

	pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
		self.progress = progress;
		self
	}

	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	/// Starts `name` and polls until it reports `Available`.
	async fn start_and_wait(&self, cancel: &CancellationToken, name: &str) -> anyhow::Result<Codespace> {
		self.progress.stage("Starting codespace");
		self.api
			.start_codespace(name)
			.await
			.with_context(|| format!("failed to start codespace {name:?}"))?;

		let deadline = Instant::now() + self.start_timeout;
		loop {
			let codespace = self
				.api
				.get_codespace(name)
				.await
				.with_context(|| format!("failed to get codespace {name:?}"))?;
			if codespace.is_available() {
				return Ok(codespace);
			}
			if Instant::now() >= deadline {
				bail!(
					"timed out waiting for codespace {name:?} to start (state {:?})",
					codespace.state
				);
			}
			debug!(state = ?codespace.state, "waiting for codespace");

			tokio::select! {
				_ = cancel.cancelled() => bail!("cancelled while waiting for codespace to start"),
				_ = tokio::time::sleep(self.poll_interval) => {}
			}
		}
	}
}

#[async_trait]
impl SessionConnector for LiveSessionConnector {
	async fn connect(
		&self,
		cancel: CancellationToken,
		codespace: &Codespace,
		logger: SessionLogger,
	) -> anyhow::Result<Arc<dyn RemoteSession>> {
		let codespace = if !codespace.is_available() {
			self.start_and_wait(&cancel, &codespace.name).await?
		} else if codespace.connection.is_none() {
			self.api.get_codespace(&codespace.name).await?
		} else {
			codespace.clone()
		};
		let details = codespace
			.connection
			.as_ref()
			.with_context(|| format!("codespace {:?} has no connection details", codespace.name))?;

		info!("Connecting to codespace");
		let session = tokio::select! {
			_ = cancel.cancelled() => bail!("cancelled while connecting"),
			session = Session::connect(details, logger) => session?,
		};
		Ok(Arc::new(session))
	}
}

#[async_trait]
impl RemoteSession for Session {
	async fn discover_service_port(&self, service: &str) -> cs_runtime::Result<(u16, String)> {
		match service {
			JUPYTER_SERVICE => self.start_jupyter_server().await,
			other => Err(cs_runtime::Error::ProtocolError(format!("unknown service {other:?}"))),
		}
	}

	async fn close(&self) -> cs_runtime::Result<()> {
		Session::close(self).await
	}
}
