use clap::Parser;
use cs_cli::{cli::Cli, commands, logging};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let cancel = CancellationToken::new();
	let on_interrupt = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::debug!("interrupt received, shutting down");
			on_interrupt.cancel();
		}
	});

	if let Err(err) = commands::dispatch(cli, cancel).await {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}
