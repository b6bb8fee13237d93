//! REST API client for codespaces and users.


use std::time::Duration;

use cs_protocol::{Codespace, CodespaceList, User};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::Config;

const USER_AGENT: &str = concat!("cs/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
	#[error("failed to create HTTP client: {0}")]
	Client(#[source] reqwest::Error),

	#[error("invalid URL {url}: {reason}")]
	Url { url: String, reason: String },

	#[error("request to {url} failed: {source}")]
	Request {
		url: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("HTTP {status} from {url}: {message}")]
	Status { url: String, status: u16, message: String },

	#[error("failed to decode response from {url}: {source}")]
	Decode {
		url: String,
		#[source]
		source: reqwest::Error,
	},
}

/// Authenticated client for the codespaces REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
	http: Client,
	api_url: Url,
	server_url: Url,
	token: String,
}

impl ApiClient {
	pub fn new(config: &Config) -> Result<Self, ApiError> {
		let http = Client::builder()
			.user_agent(USER_AGENT)
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(ApiError::Client)?;
		Ok(Self {
			http,
			api_url: config.api_url.clone(),
			server_url: config.server_url.clone(),
			token: config.token.clone(),
		})
	}

	/// `GET /user`
	pub async fn get_user(&self) -> Result<User, ApiError> {
		let url = join(&self.api_url, &["user"])?;
		self.fetch_json(self.api_request(self.http.get(url.clone())), &url).await
	}

	/// `GET /user/codespaces`
	pub async fn list_codespaces(&self) -> Result<Vec<Codespace>, ApiError> {
		let mut url = join(&self.api_url, &["user", "codespaces"])?;
		url.query_pairs_mut().append_pair("per_page", "100");
		let list: CodespaceList = self.fetch_json(self.api_request(self.http.get(url.clone())), &url).await?;
		Ok(list.codespaces)
	}

	/// `GET /user/codespaces/{name}`, including connection details.
	pub async fn get_codespace(&self, name: &str) -> Result<Codespace, ApiError> {
		let mut url = join(&self.api_url, &["user", "codespaces", name])?;
		url.query_pairs_mut()
			.append_pair("internal", "true")
			.append_pair("refresh", "true");
		self.fetch_json(self.api_request(self.http.get(url.clone())), &url).await
	}

	/// `POST /user/codespaces/{name}/start`
	pub async fn start_codespace(&self, name: &str) -> Result<(), ApiError> {
		let url = join(&self.api_url, &["user", "codespaces", name, "start"])?;
		self.send(self.api_request(self.http.post(url.clone())), &url).await?;
		Ok(())
	}

	/// Public SSH keys of `login`, one per line, from `{server}/{login}.keys`.
	pub async fn authorized_keys(&self, login: &str) -> Result<String, ApiError> {
		let keys = format!("{login}.keys");
		let url = join(&self.server_url, &[keys.as_str()])?;
		let response = self.send(self.http.get(url.clone()), &url).await?;
		response.text().await.map_err(|source| ApiError::Decode {
			url: url.to_string(),
			source,
		})
	}

	fn api_request(&self, request: RequestBuilder) -> RequestBuilder {
		request
			.bearer_auth(&self.token)
			.header(ACCEPT, "application/vnd.github+json")
	}

	async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T, ApiError> {
		let response = self.send(request, url).await?;
		response.json().await.map_err(|source| ApiError::Decode {
			url: url.to_string(),
			source,
		})
	}

	async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, ApiError> {
		debug!(url = %url, "api request");
		let response = request.send().await.map_err(|source| ApiError::Request {
			url: url.to_string(),
			source,
		})?;

		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}

		let body = response.text().await.unwrap_or_default();
		Err(ApiError::Status {
			url: url.to_string(),
			status: status.as_u16(),
			message: error_message(&body).unwrap_or_else(|| status.to_string()),
		})
	}
}

/// Extracts `message` from a JSON error body.
fn error_message(body: &str) -> Option<String> {
	let value: serde_json::Value = serde_json::from_str(body).ok()?;
	value.get("message")?.as_str().map(str::to_string)
}

/// Appends path segments to a base URL, keeping any base path.
fn join(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
	let mut url = base.clone();
	url.path_segments_mut()
		.map_err(|()| ApiError::Url {
			url: base.to_string(),
			reason: "URL cannot be a base".to_string(),
		})?
		.pop_if_empty()
		.extend(segments);
	Ok(url)
}
