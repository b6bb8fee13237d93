//! `cs jupyter`: tunnel a codespace's JupyterLab to a local port and open it.
//!
//! The command runs until the tunnel closes or the user cancels. Cancelling is
//! a clean exit; a tunnel that closes on its own is reported as an error.
//!
//! Teardown happens in a fixed order on every path once the session is up:
//! the tunnel is told to stop and joined (which closes the local listener),
//! then the session is closed, then the debug log.


use std::sync::Arc;

use cs_protocol::{Codespace, JUPYTER_SERVICE};
use cs_runtime::{PortForwarder, SessionLogger, noop_logger};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::{App, RemoteSession};
use crate::cli::JupyterArgs;
use crate::debug_log::FileLogger;
use crate::error::{CsError, Result};

/// Opens `args.codespace` (or the only codespace) in JupyterLab.
///
/// Returns `Ok(())` when `cancel` fires and an error for every other way
/// the command can end, including the tunnel closing.
pub async fn run(cancel: CancellationToken, app: &App, args: &JupyterArgs) -> Result<()> {
	// Everything spawned below stops once this call returns.
	let child = cancel.child_token();
	let _stop_children = child.clone().drop_guard();

	let codespace = app
		.resolver
		.resolve(args.codespace.as_deref())
		.await
		.map_err(CsError::Resolve)?;

	// Checked in the background; only consulted if connecting fails.
	let (credentials_tx, credentials_rx) = oneshot::channel();
	let checker = Arc::clone(&app.credentials);
	let check_cancel = cancel.clone();
	tokio::spawn(async move {
		let _ = credentials_tx.send(checker.check(check_cancel).await);
	});

	let debug_log = open_debug_log(args)?;
	let logger = match &debug_log {
		Some(log) => Arc::clone(log) as SessionLogger,
		None => noop_logger(),
	};

	let result = connect_and_serve(&child, app, &codespace, logger, credentials_rx).await;

	match debug_log {
		Some(log) => result.and(log.close().map_err(CsError::CloseLog)),
		None => result,
	}
}

fn open_debug_log(args: &JupyterArgs) -> Result<Option<Arc<FileLogger>>> {
	if !args.debug && args.debug_file.is_none() {
		return Ok(None);
	}
	let log = FileLogger::create(args.debug_file.as_deref()).map_err(CsError::DebugLog)?;
	eprintln!("Debug file located at: {}", log.path().display());
	Ok(Some(Arc::new(log)))
}

async fn connect_and_serve(
	cancel: &CancellationToken,
	app: &App,
	codespace: &Codespace,
	logger: SessionLogger,
	credentials: oneshot::Receiver<anyhow::Result<()>>,
) -> Result<()> {
	let session = match app.connector.connect(cancel.clone(), codespace, logger).await {
		Ok(session) => session,
		Err(err) => {
			if let Ok(Err(credentials_err)) = credentials.await {
				return Err(CsError::Credentials(credentials_err));
			}
			return Err(CsError::Connect(err));
		}
	};

	let result = serve(cancel, app, Arc::clone(&session)).await;

	let closed = session.close().await.map_err(CsError::CloseSession);
	result.and(closed)
}

async fn serve(cancel: &CancellationToken, app: &App, session: Arc<dyn RemoteSession>) -> Result<()> {
	app.progress.stage("Fetching Jupyter details");
	let (remote_port, server_url) = session
		.discover_service_port(JUPYTER_SERVICE)
		.await
		.map_err(CsError::Discovery)?;

	// Bound before the URL is handed out so the first request finds a listener.
	let listener = TcpListener::bind(app.listen_addr)
		.await
		.map_err(CsError::Bind)?;
	let local_port = listener.local_addr().map_err(CsError::Bind)?.port();
	debug!(remote_port, local_port, "forwarding JupyterLab");

	let (closed_tx, closed_rx) = oneshot::channel();
	let forwarder = PortForwarder::new(session, JUPYTER_SERVICE, remote_port, true);
	let tunnel_cancel = cancel.clone();
	let tunnel = tokio::spawn(async move {
		let _ = closed_tx.send(forwarder.forward_to_listener(tunnel_cancel, listener).await);
	});

	let target = rewrite_url(&server_url, remote_port, local_port);
	let result = open_and_wait(cancel, app, &target, closed_rx).await;

	cancel.cancel();
	if let Err(e) = tunnel.await {
		warn!(error = %e, "tunnel task failed");
	}
	result
}

async fn open_and_wait(
	cancel: &CancellationToken,
	app: &App,
	target: &str,
	closed: oneshot::Receiver<cs_runtime::Error>,
) -> Result<()> {
	info!(url = %target, "Opening JupyterLab");
	app.opener.open(target).await.map_err(CsError::Open)?;

	tokio::select! {
		biased;
		_ = cancel.cancelled() => Ok(()),
		reason = closed => Err(CsError::TunnelClosed(reason.unwrap_or(cs_runtime::Error::ChannelClosed))),
	}
}

/// Points `server_url` at the local end of the tunnel.
///
/// Only the first occurrence of the remote port is replaced, which keeps the
/// rest of the URL (including its access token) intact.
pub fn rewrite_url(server_url: &str, remote_port: u16, local_port: u16) -> String {
	server_url.replacen(&remote_port.to_string(), &local_port.to_string(), 1)
}
