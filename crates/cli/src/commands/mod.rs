pub mod jupyter;

use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::error::Result;

/// Runs the selected command until it finishes or `cancel` fires.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<()> {
	let config = Config::load(&cli)?;
	let app = App::live(&config)?;

	match cli.command {
		Commands::Jupyter(args) => jupyter::run(cancel, &app, &args).await,
	}
}
