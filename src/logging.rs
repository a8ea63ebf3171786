use std::path::Path;

use tokio::sync::RwLock;
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{prelude::*, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
}

fn do_init(log_dir: Option<&Path>) {
    let mut message = String::from("Logging with:");

    // stdout
    message += " stdout";

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(env_filter());

    let registry = tracing_subscriber::registry().with(stdout_layer);

    let maybe_file_layer = if let Some(output_dir) = log_dir {
        message += &format!(", file (in dir {output_dir:?})");

        let file_appender = RollingFileAppender::new(Rotation::DAILY, output_dir, "serial-gate.log");

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_filter(env_filter());
        Some(file_layer)
    } else {
        None
    };

    registry.with(maybe_file_layer).init();

    debug!(message);
}

/// Initialize tracing.
///
/// Will only initialize once, so tests may call this.
pub async fn init(log_dir: Option<&Path>) {
    static TRACING_IS_INITIALIZED: RwLock<bool> = RwLock::const_new(false);

    let initialized = { *TRACING_IS_INITIALIZED.read().await };

    if !initialized {
        let mut initialized = TRACING_IS_INITIALIZED.write().await;

        // To avoid race condition between the `.read()` and the
        // `.write()`.
        if *initialized {
            return;
        }

        do_init(log_dir);

        *initialized = true;
    }

    info!("Logging initialized");
}
