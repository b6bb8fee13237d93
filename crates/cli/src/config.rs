//! Configuration resolution.
//!
//! Values come from, in order of precedence: command-line flags (and their
//! environment variables), the JSON config file, and built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::cli::Cli;
use crate::error::{CsError, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_SERVER_URL: &str = "https://github.com";
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(300);

/// Contents of `config.json`. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
	pub api_url: Option<String>,
	pub server_url: Option<String>,
	pub token: Option<String>,
	pub start_timeout_secs: Option<u64>,
}

impl ConfigFile {
	/// `<config dir>/cs/config.json`, when the platform has a config dir.
	pub fn default_path() -> Option<PathBuf> {
		dirs::config_dir().map(|dir| dir.join("cs").join("config.json"))
	}

	/// Reads `path`; a missing file yields the empty config.
	pub fn load(path: &Path) -> Result<Self> {
		let text = match std::fs::read_to_string(path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
			Err(e) => return Err(CsError::Config(format!("failed to read {}: {e}", path.display()))),
		};
		serde_json::from_str(&text).map_err(|e| CsError::Config(format!("invalid config file {}: {e}", path.display())))
	}
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
	pub api_url: Url,
	pub server_url: Url,
	pub token: String,
	/// How long to wait for a stopped codespace to become available.
	pub start_timeout: Duration,
}

impl Config {
	/// Loads the config file named by `--config` (or the default location)
	/// and resolves it against the command-line flags.
	pub fn load(cli: &Cli) -> Result<Self> {
		let file = match cli.config.clone().or_else(ConfigFile::default_path) {
			Some(path) => ConfigFile::load(&path)?,
			None => ConfigFile::default(),
		};
		let fallback_token = std::env::var("GITHUB_TOKEN").ok();
		Self::resolve(cli, file, fallback_token)
	}

	/// Merges flags over `file` over defaults.
	///
	/// `fallback_token` is consulted only when neither the flags nor the file
	/// supply a token.
	pub fn resolve(cli: &Cli, file: ConfigFile, fallback_token: Option<String>) -> Result<Self> {
		let api_url = cli.api_url.clone().or(file.api_url).unwrap_or_else(|| DEFAULT_API_URL.to_string());
		let server_url = cli
			.server_url
			.clone()
			.or(file.server_url)
			.unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
		let token = cli
			.token
			.clone()
			.or(file.token)
			.or(fallback_token)
			.filter(|token| !token.trim().is_empty())
			.ok_or_else(|| {
				CsError::Config("no access token: pass --token or set GH_TOKEN or GITHUB_TOKEN".to_string())
			})?;
		let start_timeout = file
			.start_timeout_secs
			.map(Duration::from_secs)
			.unwrap_or(DEFAULT_START_TIMEOUT);

		Ok(Self {
			api_url: parse_base_url("API", &api_url)?,
			server_url: parse_base_url("server", &server_url)?,
			token,
			start_timeout,
		})
	}
}

fn parse_base_url(what: &str, value: &str) -> Result<Url> {
	let url = Url::parse(value).map_err(|e| CsError::Config(format!("invalid {what} URL {value:?}: {e}")))?;
	match url.scheme() {
		"http" | "https" => Ok(url),
		other => Err(CsError::Config(format!("invalid {what} URL {value:?}: unsupported scheme {other:?}"))),
	}
}
