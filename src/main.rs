//! mdex-tracker daemon.
//!
//! Loads configuration, opens the database, wires the job runners behind
//! the run coordinator, starts the cron scheduler and the control socket,
//! then idles until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use mdex_tracker_lib::application::{
    DeepCheckRunner, IncrementalScanner, NotificationDispatcher, RunCoordinator, TitleRefresher,
    start_scheduler,
};
use mdex_tracker_lib::control::ControlListener;
use mdex_tracker_lib::infrastructure::{
    ConfigManager, DatabaseConnection, MangaDexClient, MangaDexClientConfig, PushoverClient,
    SqliteWatermarkStore, init_logging_with_config,
};

#[tokio::main]
async fn main() -> Result<()> {
    let manager = ConfigManager::new()?;
    let mut config = manager.load_config().await?;
    config.apply_env_overrides();

    init_logging_with_config(config.logging.clone())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %manager.config_path.display(),
        "mdex-tracker starting"
    );

    let database_url = config.database_url()?;
    let connection = DatabaseConnection::new(&database_url, config.database.max_connections)
        .await
        .context("opening database")?;
    connection.migrate().await.context("running migrations")?;
    let pool = Arc::new(connection.pool().clone());

    let store = Arc::new(SqliteWatermarkStore::new(pool));
    let catalog = Arc::new(
        MangaDexClient::new(MangaDexClientConfig::from(&config.catalog))
            .context("building catalog client")?,
    );
    let push = Arc::new(
        PushoverClient::new(config.pushover.api_url.clone()).context("building push client")?,
    );
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        push,
        &config.pushover,
    ));

    let scanner = Arc::new(IncrementalScanner::new(
        store.clone(),
        catalog.clone(),
        dispatcher.clone(),
        config.catalog.page_size,
        config.catalog.max_feed_pages,
    ));
    let deep = Arc::new(DeepCheckRunner::new(
        store.clone(),
        catalog.clone(),
        dispatcher,
        &config.jobs,
    ));
    let titles = Arc::new(TitleRefresher::new(
        store.clone(),
        catalog,
        config.jobs.title_batch_size,
    ));
    let coordinator = Arc::new(RunCoordinator::new(store, scanner, deep, titles));

    let mut scheduler = start_scheduler(coordinator.clone(), &config.schedules)
        .await
        .context("starting scheduler")?;

    let shutdown = CancellationToken::new();
    let listener = ControlListener::new(coordinator, config.socket_path(), shutdown.clone());
    let listener_task = tokio::spawn(async move { listener.run().await });

    wait_for_shutdown().await?;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler did not stop cleanly: {}", e);
    }
    match listener_task.await {
        Ok(result) => result?,
        Err(e) => tracing::warn!("Control listener task failed: {}", e),
    }

    tracing::info!("mdex-tracker stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("waiting for ctrl-c")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
