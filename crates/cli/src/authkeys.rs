//! Checks that the user has SSH keys the codespace will accept.

use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::app::CredentialChecker;

/// Passes when the authenticated user has at least one authorized SSH key.
pub struct AuthorizedKeysChecker {
	api: Arc<ApiClient>,
}

impl AuthorizedKeysChecker {
	pub fn new(api: Arc<ApiClient>) -> Self {
		Self { api }
	}

	async fn check_keys(&self) -> anyhow::Result<()> {
		let user = self.api.get_user().await.context("failed to get current user")?;
		let keys = self
			.api
			.authorized_keys(&user.login)
			.await
			.with_context(|| format!("failed to read GitHub-authorized SSH keys for {}", user.login))?;

		if keys.trim().is_empty() {
			bail!("user {} has no GitHub-authorized SSH keys", user.login);
		}
		Ok(())
	}
}

#[async_trait]
impl CredentialChecker for AuthorizedKeysChecker {
	/// A cancelled check is inconclusive and reports no problem.
	async fn check(&self, cancel: CancellationToken) -> anyhow::Result<()> {
		tokio::select! {
			_ = cancel.cancelled() => {
				tracing::debug!("authorized keys check cancelled");
				Ok(())
			}
			result = self.check_keys() => result,
		}
	}
}
