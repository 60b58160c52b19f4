// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dataroom: watermarked document delivery for investor datarooms.
//
// Entry point. Loads configuration, initialises logging and backend
// services, and serves the HTTP API until SIGINT or SIGTERM.

mod api;
mod services;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dataroom_core::DataroomConfig;
use dataroom_core::config::LogFormat;

use services::app_services::AppServices;
use services::data_dir::data_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = DataroomConfig::load(&data_dir())?;
    config.apply_env(|key| std::env::var(key).ok())?;

    init_logging(config.log_format);
    info!(version = env!("CARGO_PKG_VERSION"), "dataroom starting");

    let services = AppServices::init(config)?;
    let bind_addr = services.config.bind_addr.clone();
    let app = api::router(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

/// `RUST_LOG` filters (default `info`); `LOG_FORMAT=json` switches to
/// structured output.
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "cannot listen for SIGINT");
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
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    warn!("shutdown signal received, draining connections");
}
