use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot, watch};
use anyhow::{Context, Result};
use crate::config::ReferenceConfig;
use crate::lookup::reference::{self, ReferenceDatabase};
use crate::lookup::watchlist::{MatchKey, Watchlist, WatchlistStore};

/// Consistent pair of lookups the classifier reads for one cycle.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub watchlist: Watchlist,
    pub reference: Arc<ReferenceDatabase>,
}

/// Commands sent to the registry thread
pub enum RegistryCommand {
    AddWatch {
        key: MatchKey,
        value: String,
        display_message: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    RemoveWatch {
        key: MatchKey,
        value: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    UpdateReference(oneshot::Sender<Result<usize>>),
    Shutdown,
}

/// Handle to the thread that owns the watchlist store and reference
/// database. It is the only writer; every mutation publishes a fresh
/// [`Lookups`] on the watch channel.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry thread and publish the initial lookups
    pub fn spawn(
        mut store: WatchlistStore,
        reference: ReferenceDatabase,
        settings: ReferenceConfig,
        lookups_tx: watch::Sender<Arc<Lookups>>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<RegistryCommand>(64);
        let mut reference = Arc::new(reference);
        publish_lookups(&lookups_tx, &store, &reference);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    RegistryCommand::AddWatch { key, value, display_message, reply } => {
                        let result: Result<bool> =
                            store.add(key, &value, &display_message).map_err(Into::into);
                        // Only republish when the watchlist actually changed
                        if matches!(&result, Ok(true)) {
                            publish_lookups(&lookups_tx, &store, &reference);
                        }
                        let _ = reply.send(result);
                    }
                    RegistryCommand::RemoveWatch { key, value, reply } => {
                        let result: Result<bool> = store.remove(key, &value).map_err(Into::into);
                        if matches!(&result, Ok(true)) {
                            publish_lookups(&lookups_tx, &store, &reference);
                        }
                        let _ = reply.send(result);
                    }
                    RegistryCommand::UpdateReference(reply) => {
                        let result = refresh_reference(&settings).map(|db| {
                            let count = db.len();
                            reference = Arc::new(db);
                            publish_lookups(&lookups_tx, &store, &reference);
                            count
                        });
                        let _ = reply.send(result);
                    }
                    RegistryCommand::Shutdown => {
                        tracing::info!("Registry thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Add a watchlist entry. Returns false if it was already present.
    pub async fn add_watch(&self, key: MatchKey, value: String, display_message: String) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RegistryCommand::AddWatch { key, value, display_message, reply })
            .await?;
        rx.await?
    }

    /// Remove a watchlist entry. Returns false if it was absent.
    pub async fn remove_watch(&self, key: MatchKey, value: String) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::RemoveWatch { key, value, reply }).await?;
        rx.await?
    }

    /// Run the update command and reload the reference database. The
    /// previous database stays in place if either step fails.
    pub async fn update_reference(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::UpdateReference(reply)).await?;
        rx.await?
    }

    /// Shutdown the registry thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(RegistryCommand::Shutdown).await?;
        Ok(())
    }
}

fn publish_lookups(
    lookups_tx: &watch::Sender<Arc<Lookups>>,
    store: &WatchlistStore,
    reference: &Arc<ReferenceDatabase>,
) {
    lookups_tx.send_replace(Arc::new(Lookups {
        watchlist: store.watchlist().clone(),
        reference: reference.clone(),
    }));
}

fn refresh_reference(settings: &ReferenceConfig) -> Result<ReferenceDatabase> {
    reference::run_update_command(&settings.update_command)?;
    let db = ReferenceDatabase::load(&settings.db_path, settings.indexed_by)
        .context("Reference reload failed")?;
    tracing::info!("Reference database reloaded with {} records", db.len());
    Ok(db)
}
