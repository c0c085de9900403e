use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::alert_log::AlertCycleLog;
use adsb_watchd::alert::sink::{AlertHistory, AlertSink};
use adsb_watchd::config::{Config, TransportConfig};
use adsb_watchd::lookup::reference::ReferenceDatabase;
use adsb_watchd::lookup::watchlist::WatchlistStore;
use adsb_watchd::monitor::{self, Monitor};
use adsb_watchd::registry::{Lookups, RegistryHandle};
use adsb_watchd::transport::{self, Publisher, Qos, Topics};
use adsb_watchd::{api, commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("adsb_watchd=info"))
        )
        .init();

    tracing::info!("Starting adsb-watchd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/adsb-watch/watchd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Open watchlist
    let store = WatchlistStore::open(&config.watchlist.path)
        .with_context(|| format!("Failed to open watchlist {}", config.watchlist.path.display()))?;
    tracing::info!(
        "Loaded {} watchlist entries from {}",
        store.watchlist().len(),
        config.watchlist.path.display()
    );

    // Load reference database
    let reference = if config.reference.skip_load {
        tracing::info!("Skipping reference database load");
        ReferenceDatabase::empty()
    } else {
        let db = ReferenceDatabase::load(&config.reference.db_path, config.reference.indexed_by)?;
        tracing::info!("Loaded {} reference records", db.len());
        db
    };

    // Start registry thread; it publishes the initial lookups itself
    let (lookups_tx, lookups_rx) = watch::channel(Arc::new(Lookups::default()));
    let registry = RegistryHandle::spawn(store, reference, config.reference.clone(), lookups_tx);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    // Connect transport, if enabled
    let (command_tx, command_rx) = mpsc::channel(64);
    let remote = match &config.transport {
        TransportConfig::Disabled => None,
        TransportConfig::Mqtt(mqtt) => {
            let client_id = config.transport.client_id()?;
            let options = transport::mqtt::mqtt_options(mqtt, &client_id);
            Some((options, client_id, Qos::AtMostOnce))
        }
        TransportConfig::Aws(aws) => {
            let client_id = config.transport.client_id()?;
            let options = transport::mqtt::aws_options(aws, &client_id)?;
            Some((options, client_id, Qos::AtLeastOnce))
        }
    };

    let publisher = match remote {
        None => {
            tracing::info!("Remote transport disabled");
            None
        }
        Some((options, client_id, subscribe_qos)) => {
            let topics = Topics::new(&client_id);
            let (mqtt, handle) = transport::mqtt::spawn(
                options,
                topics.command().to_string(),
                subscribe_qos,
                command_tx,
                cancel.clone(),
            );
            tasks.push(handle);
            tracing::info!("Remote transport on {}", topics.command());
            Some(Publisher::new(Arc::new(mqtt), topics))
        }
    };

    // Spawn command handler
    if let Some(publisher) = publisher.clone() {
        let cmd_registry = registry.clone();
        let cmd_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = commands::run(command_rx, cmd_registry, publisher, cmd_cancel).await {
                tracing::error!("Command handler error: {}", e);
            }
        }));
    }

    // Spawn monitor loop
    let (alerts_tx, alerts_rx) =
        watch::channel(Arc::new(AlertCycleLog { written_at: 0.0, entries: Vec::new() }));
    let sink = AlertSink::new(
        &config.alerts.log_path,
        AlertHistory::new(&config.alerts.history_path),
        publisher.clone(),
    );
    let monitor = Monitor::new(lookups_rx.clone(), sink, publisher, alerts_tx);
    let monitor_cancel = cancel.clone();
    let feed = config.feed.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = monitor::run(monitor, feed, monitor_cancel).await {
            tracing::error!("Monitor error: {}", e);
        }
    }));

    // Status API, if configured
    if let Some(listen) = &config.api.listen {
        let app = api::routes::router(api::routes::AppState { alerts_rx, lookups_rx });
        let listener = tokio::net::TcpListener::bind(listen)
            .await
            .with_context(|| format!("Failed to bind to {}", listen))?;

        tracing::info!("API listening on {}", listen);

        let server_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_cancel.cancelled().await })
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        }));
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    for task in tasks {
        let _ = task.await;
    }

    // Shutdown registry thread
    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
