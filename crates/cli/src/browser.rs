//! Opening URLs in the user's browser.

use std::process::{Command, Stdio};

use anyhow::{Context, bail};
use async_trait::async_trait;

use crate::app::Opener;

/// Launches the system browser, honoring `$BROWSER`.
pub struct SystemBrowser;

#[async_trait]
impl Opener for SystemBrowser {
	async fn open(&self, url: &str) -> anyhow::Result<()> {
		let (program, args) = browser_command(std::env::var("BROWSER").ok(), url)?;
		tracing::debug!(%program, ?args, "launching browser");

		let mut cmd = Command::new(&program);
		cmd.args(&args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

		#[cfg(unix)]
		std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

		cmd.spawn().with_context(|| format!("failed to launch {program}"))?;
		Ok(())
	}
}

/// Program and arguments that open `url`.
fn browser_command(browser_env: Option<String>, url: &str) -> anyhow::Result<(String, Vec<String>)> {
	if let Some(browser) = browser_env.filter(|b| !b.trim().is_empty()) {
		return Ok((browser, vec![url.to_string()]));
	}

	if cfg!(target_os = "macos") {
		return Ok(("open".to_string(), vec![url.to_string()]));
	}
	if cfg!(target_os = "windows") {
		return Ok((
			"cmd".to_string(),
			vec!["/C".to_string(), "start".to_string(), String::new(), url.to_string()],
		));
	}

	for candidate in ["xdg-open", "wslview", "sensible-browser"] {
		if which::which(candidate).is_ok() {
			return Ok((candidate.to_string(), vec![url.to_string()]));
		}
	}
	bail!("could not find a browser to open {url}; set $BROWSER")
}
