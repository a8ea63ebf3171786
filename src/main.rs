use clap::Parser;
use color_eyre::Result;
use serial_gate::{cli, config::Config, logging, server};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tracing::{debug, info};

#[cfg(unix)]
async fn hangup() {
    match signal(SignalKind::hangup()) {
        Ok(mut hangup) => {
            hangup.recv().await;
        }
        Err(e) => {
            debug!(?e, "Cannot listen for hangups");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn hangup() {
    std::future::pending::<()>().await
}

async fn shutdown() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hangup() => {
            info!("Told to hang up, quitting")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command)?;

        return Ok(());
    }

    let mut config = if let Some(config_path) = cli.config {
        let config = Config::new_from_path(&config_path)?;
        logging::init(config.log_dir.as_deref()).await;
        debug!(?config_path, "Config from path");
        config
    } else {
        let config = Config::default();
        logging::init(config.log_dir.as_deref()).await;
        debug!("Default config");
        config
    };

    if let Some(port) = cli.http_port {
        config.http_port = port;
    }

    let port = config.http_port;
    server::run_on_port(config, server::Routes::builtins(), port, shutdown()).await?;

    Ok(())
}
