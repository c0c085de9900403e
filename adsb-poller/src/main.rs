use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use adsb_poller::config::{Config, NotifyMethod};
use adsb_poller::notify::{DesktopNotifier, LogNotifier, Notifier};
use adsb_poller::poller::{AlertPoller, PollSettings};
use adsb_poller::session::SshConnector;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("adsb_poller=info"))
        )
        .init();

    tracing::info!("Starting adsb-poller");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/adsb-watch/poller.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    let notifier: Box<dyn Notifier> = match config.notify.method {
        NotifyMethod::Desktop => Box::new(DesktopNotifier),
        NotifyMethod::Log => Box::new(LogNotifier),
    };
    let settings = PollSettings::from_config(&config);
    let mut poller = AlertPoller::new(SshConnector::new(config.remote.clone()), notifier, settings);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
        signal_cancel.cancel();
    });

    tracing::info!(
        "Polling {}@{}:{}",
        config.remote.username,
        config.remote.hostname,
        config.remote.port
    );

    while !cancel.is_cancelled() {
        // Session I/O is blocking and bounded by the SSH timeout
        let step = tokio::task::block_in_place(|| poller.step(Utc::now));
        if let Some(outcome) = &step.outcome {
            tracing::debug!("Poll outcome: {:?}", outcome);
        }

        tokio::select! {
            _ = tokio::time::sleep(step.delay) => {}
            _ = cancel.cancelled() => break,
        }
    }

    poller.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
