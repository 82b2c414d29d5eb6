mod api;
mod bootstrap;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use vendedor_core::config::{AppConfig, LoadOptions};
use vendedor_transport::InboundHandler;

const STATUS_HEARTBEAT: Duration = Duration::from_secs(60);

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use vendedor_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let cancel = CancellationToken::new();
    let engagement = &app.config.engagement;

    let api = api::spawn(
        &app.config.server.bind_address,
        app.config.server.port,
        api::ApiState::from_application(&app),
        cancel.clone(),
    )
    .await?;

    let background = [
        tasks::spawn_rate_limit_sweep(
            Arc::clone(&app.rate_limiter),
            Duration::from_secs(engagement.rate_limit_sweep_secs),
            cancel.clone(),
        ),
        tasks::spawn_abandoned_cart_monitor(
            Arc::clone(&app.orchestrator),
            engagement.abandoned_cart_threshold(),
            Duration::from_secs(engagement.abandoned_scan_secs),
            cancel.clone(),
        ),
        tasks::spawn_status_heartbeat(
            Arc::clone(&app.supervisor),
            Arc::clone(&app.rate_limiter),
            STATUS_HEARTBEAT,
            cancel.clone(),
        ),
    ];

    let supervisor = Arc::clone(&app.supervisor);
    let handler: Arc<dyn InboundHandler> = app.orchestrator.clone();
    let connection = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = supervisor.run(handler, cancel).await {
                tracing::error!(
                    event_name = "system.server.connection_stopped",
                    correlation_id = "supervisor",
                    error = %error,
                    fatal = error.is_fatal(),
                    "chat connection supervisor stopped; ops api keeps serving"
                );
            }
        })
    };

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        port = app.config.server.port,
        "vendedor-server started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "vendedor-server stopping"
    );
    cancel.cancel();

    connection.await?;
    for task in background {
        task.await?;
    }
    api.await?;
    if let Some(pool) = &app.db_pool {
        pool.close().await;
    }

    Ok(())
}
