mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = castconfig::get_config();
    let _logs = castserver::logs::init_logging(&config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping...");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Discover { timeout, json } => commands::discover(timeout, json, &cancel).await,
        Command::Tracks { file, json } => commands::tracks(&file, json).await,
        Command::Serve { dir } => commands::serve(&dir, &cancel).await,
        Command::Cast {
            file,
            device,
            subtitle,
            audio,
            timeout,
        } => {
            commands::cast(
                &file,
                device.as_deref(),
                subtitle,
                audio,
                timeout,
                &cancel,
            )
            .await
        }
    }
}
