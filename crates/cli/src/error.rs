use thiserror::Error;

pub type Result<T> = std::result::Result<T, CsError>;

/// Failure of a `cs` command.
///
/// Each variant names the stage that failed so the final message tells the
/// user where things went wrong.
#[derive(Debug, Error)]
pub enum CsError {
	#[error("get or choose codespace: {0:#}")]
	Resolve(#[source] anyhow::Error),

	#[error("error creating debug logger: {0}")]
	DebugLog(#[source] std::io::Error),

	/// Credential problems replace a connection failure; the checker's
	/// message is already user-facing.
	#[error("{0:#}")]
	Credentials(anyhow::Error),

	#[error("error connecting to codespace: {0:#}")]
	Connect(#[source] anyhow::Error),

	#[error("failed to discover JupyterLab port: {0}")]
	Discovery(#[source] cs_runtime::Error),

	#[error("failed to listen on local port: {0}")]
	Bind(#[source] std::io::Error),

	#[error("failed to open JupyterLab in browser: {0:#}")]
	Open(#[source] anyhow::Error),

	#[error("tunnel closed: {0}")]
	TunnelClosed(#[source] cs_runtime::Error),

	#[error("error closing session: {0}")]
	CloseSession(#[source] cs_runtime::Error),

	#[error("error closing debug log: {0}")]
	CloseLog(#[source] std::io::Error),

	#[error("configuration error: {0}")]
	Config(String),

	#[error(transparent)]
	Api(#[from] crate::api::ApiError),
}
