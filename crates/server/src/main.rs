mod api;
mod bootstrap;
mod health;
mod inbound;
mod reminders;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use atendia_channel::{ChannelRunner, ChannelTransport, ReconnectPolicy};
use atendia_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::ApiState;
use crate::inbound::InboundPipeline;
use crate::reminders::ReminderScheduler;

fn init_logging(config: &AppConfig) {
    use atendia_core::config::LogFormat::*;
    use tracing::Level;

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
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pipeline =
        Arc::new(InboundPipeline::new(app.conversations.clone(), app.agent.clone(), app.sender.clone()));
    let runner = ChannelRunner::new(app.transport.clone(), pipeline, ReconnectPolicy::default());
    let channel_task = tokio::spawn(async move { runner.start().await });

    let reminder_task = if app.config.reminders.enabled {
        let scheduler =
            ReminderScheduler::new(app.ledger.clone(), app.sender.clone(), app.config.reminders.clone());
        Some(tokio::spawn(scheduler.run(shutdown_rx.clone())))
    } else {
        info!(event_name = "reminders.disabled", "reminder scheduler disabled by configuration");
        None
    };

    let routes = health::router(app.db_pool.clone(), app.channel_mode()).merge(api::router(ApiState {
        ledger: app.ledger.clone(),
        conversations: app.conversations.clone(),
        practice_config: app.practice_config.clone(),
        inbox: app.inbox.clone(),
        webhook_token: app.config.channel.token.clone(),
    }));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("could not bind http listener on {address}"))?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        channel_mode = app.channel_mode(),
        "atendia-server listening"
    );

    let mut server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, routes)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    wait_for_shutdown().await?;
    info!(event_name = "system.server.stopping", correlation_id = "shutdown", "atendia-server stopping");
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(error))) => warn!(event_name = "system.server.error", error = %error, "http server failed"),
        Ok(Err(error)) => warn!(event_name = "system.server.error", error = %error, "http server task panicked"),
        Err(_) => warn!(event_name = "system.server.shutdown_timeout", "http server did not stop in time"),
    }
    if let Some(task) = reminder_task {
        let _ = tokio::time::timeout(grace, task).await;
    }

    // The runner only ends once every inbox handle is gone.
    drop(app.inbox);
    if tokio::time::timeout(grace, app.transport.disconnect()).await.is_err() {
        warn!(event_name = "system.channel.disconnect_timeout", "channel transport did not disconnect in time");
    }
    if tokio::time::timeout(grace, channel_task).await.is_err() {
        warn!(event_name = "system.channel.shutdown_timeout", "channel runner did not drain in time");
    }

    app.db_pool.close().await;
    info!(event_name = "system.server.stopped", correlation_id = "shutdown", "atendia-server stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
