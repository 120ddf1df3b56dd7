use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetryConfig;

/// Install the global subscriber; `RUST_LOG` overrides the configured filter
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));
    let (json, plain) = if config.json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };
    // A second call in the same process keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
    info!("shutdown signal received");
}
