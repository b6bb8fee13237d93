
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::styles::cli_styles;

/// Root CLI for cs.
#[derive(Parser, Debug)]
#[command(name = "cs")]
#[command(about = "Work with codespaces from the command line")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Path to the configuration file
	#[arg(long, global = true, env = "CS_CONFIG", value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Base URL of the REST API
	#[arg(long, global = true, env = "CS_API_URL", value_name = "URL")]
	pub api_url: Option<String>,

	/// Base URL of the web server hosting authorized keys
	#[arg(long, global = true, env = "CS_SERVER_URL", value_name = "URL")]
	pub server_url: Option<String>,

	/// Access token (falls back to GITHUB_TOKEN)
	#[arg(long, global = true, env = "GH_TOKEN", hide_env_values = true, value_name = "TOKEN")]
	pub token: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Open a codespace in JupyterLab.
	Jupyter(JupyterArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct JupyterArgs {
	/// Name of the codespace
	#[arg(short, long, value_name = "NAME")]
	pub codespace: Option<String>,

	/// Log session traffic to a file
	#[arg(short, long)]
	pub debug: bool,

	/// Path of the debug log (implies --debug)
	#[arg(long, value_name = "FILE")]
	pub debug_file: Option<PathBuf>,
}
