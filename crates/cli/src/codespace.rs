//! Choosing which codespace a command acts on.

use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use cs_protocol::Codespace;

use crate::api::ApiClient;
use crate::app::EnvironmentResolver;

/// Resolves codespaces through the REST API.
pub struct ApiResolver {
	api: Arc<ApiClient>,
}

impl ApiResolver {
	pub fn new(api: Arc<ApiClient>) -> Self {
		Self { api }
	}
}

#[async_trait]
impl EnvironmentResolver for ApiResolver {
	async fn resolve(&self, name: Option<&str>) -> anyhow::Result<Codespace> {
		if let Some(name) = name {
			return self
				.api
				.get_codespace(name)
				.await
				.with_context(|| format!("getting codespace {name:?}"));
		}

		let codespaces = self.api.list_codespaces().await.context("listing codespaces")?;
		let chosen = choose_codespace(&codespaces)?;
		tracing::info!(codespace = %chosen.name, "using codespace {}", chosen.label());

		// List entries omit connection details; fetch the full record.
		self.api
			.get_codespace(&chosen.name)
			.await
			.with_context(|| format!("getting codespace {:?}", chosen.name))
	}
}

/// Picks the only codespace, or explains why none can be picked.
pub fn choose_codespace(codespaces: &[Codespace]) -> anyhow::Result<&Codespace> {
	match codespaces {
		[] => bail!("you have no codespaces"),
		[only] => Ok(only),
		many => {
			let names: Vec<String> = many
				.iter()
				.map(|cs| match &cs.repository {
					Some(repo) => format!("{} ({})", cs.name, repo.full_name),
					None => cs.name.clone(),
				})
				.collect();
			bail!(
				"you have {} codespaces, choose one with --codespace: {}",
				many.len(),
				names.join(", ")
			)
		}
	}
}
