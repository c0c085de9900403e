use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use shared::protocol::{
    CMD_DB_UPDATE, CMD_PING, CMD_WATCH_ADD, CMD_WATCH_ADD_MARK, CMD_WATCH_REMOVE,
    CMD_WATCH_REMOVE_MARK,
};
use shared::types::Identifier;
use crate::lookup::watchlist::MatchKey;
use crate::registry::RegistryHandle;
use crate::transport::{Publisher, Qos};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    WatchAdd {
        key: MatchKey,
        value: String,
        display_message: String,
    },
    WatchRemove {
        key: MatchKey,
        value: String,
    },
    DbUpdate,
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid identifier {0:?}, expected six hex digits")]
    InvalidIdentifier(String),
}

impl RemoteCommand {
    /// Parse a whitespace-delimited command line
    pub fn parse(payload: &str) -> Result<Self, CommandError> {
        let mut words = payload.split_whitespace();
        let Some(command) = words.next() else {
            return Err(CommandError::Empty);
        };

        match command {
            CMD_WATCH_ADD | CMD_WATCH_ADD_MARK => {
                let key = key_for(command);
                let usage = if key == MatchKey::Identifier {
                    "watch_add <identifier> <display message>"
                } else {
                    "watch_add_mark <mark> <display message>"
                };
                let value = words.next().ok_or(CommandError::Usage(usage))?;
                let display_message = words.collect::<Vec<_>>().join(" ");
                if display_message.is_empty() {
                    return Err(CommandError::Usage(usage));
                }
                Ok(RemoteCommand::WatchAdd {
                    key,
                    value: checked_value(key, value)?,
                    display_message,
                })
            }
            CMD_WATCH_REMOVE | CMD_WATCH_REMOVE_MARK => {
                let key = key_for(command);
                let usage = if key == MatchKey::Identifier {
                    "watch_remove <identifier>"
                } else {
                    "watch_remove_mark <mark>"
                };
                let value = words.next().ok_or(CommandError::Usage(usage))?;
                Ok(RemoteCommand::WatchRemove {
                    key,
                    value: checked_value(key, value)?,
                })
            }
            CMD_DB_UPDATE => Ok(RemoteCommand::DbUpdate),
            CMD_PING => Ok(RemoteCommand::Ping),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn key_for(command: &str) -> MatchKey {
    if command == CMD_WATCH_ADD_MARK || command == CMD_WATCH_REMOVE_MARK {
        MatchKey::Mark
    } else {
        MatchKey::Identifier
    }
}

fn checked_value(key: MatchKey, value: &str) -> Result<String, CommandError> {
    match key {
        MatchKey::Identifier => {
            let id = Identifier::new(value);
            if !id.is_canonical() {
                return Err(CommandError::InvalidIdentifier(value.to_string()));
            }
            Ok(id.into())
        }
        MatchKey::Mark => Ok(value.to_ascii_uppercase()),
    }
}

/// Execute one payload and return the reply to publish, if any. Replies
/// share the command topic, so unknown words get no reply.
pub async fn handle(payload: &str, registry: &RegistryHandle) -> Option<String> {
    let command = match RemoteCommand::parse(payload) {
        Ok(command) => command,
        Err(CommandError::Empty) => return None,
        Err(CommandError::Unknown(word)) => {
            tracing::debug!("Ignoring non-command payload starting with {:?}", word);
            return None;
        }
        Err(e) => {
            tracing::warn!("Rejected command {:?}: {}", payload, e);
            return Some(e.to_string());
        }
    };

    tracing::info!("Remote command: {:?}", command);
    let reply = match command {
        RemoteCommand::WatchAdd { key, value, display_message } => {
            match registry.add_watch(key, value, display_message).await {
                Ok(true) => "Adding to watchlist".to_string(),
                Ok(false) => "Already on watchlist".to_string(),
                Err(e) => {
                    tracing::error!("Failed to add watchlist entry: {:#}", e);
                    "Watchlist add failed".to_string()
                }
            }
        }
        RemoteCommand::WatchRemove { key, value } => {
            match registry.remove_watch(key, value).await {
                Ok(true) => "Removing from watchlist".to_string(),
                Ok(false) => "Not on watchlist".to_string(),
                Err(e) => {
                    tracing::error!("Failed to remove watchlist entry: {:#}", e);
                    "Watchlist remove failed".to_string()
                }
            }
        }
        RemoteCommand::DbUpdate => {
            // Reload runs in the background so pings stay responsive
            let registry = registry.clone();
            tokio::spawn(async move {
                match registry.update_reference().await {
                    Ok(count) => tracing::info!("Reference update complete, {} records", count),
                    Err(e) => tracing::error!("Reference update failed: {:#}", e),
                }
            });
            "Updating Database".to_string()
        }
        RemoteCommand::Ping => "Pong".to_string(),
    };
    Some(reply)
}

/// Command loop: one payload at a time, replies on the command topic.
pub async fn run(
    mut rx: mpsc::Receiver<String>,
    registry: RegistryHandle,
    publisher: Publisher,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            payload = rx.recv() => {
                let Some(payload) = payload else {
                    break;
                };
                if let Some(reply) = handle(&payload, &registry).await {
                    publisher.publish(publisher.topics().command(), &reply, Qos::AtMostOnce);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Command handler shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferenceConfig;
    use crate::lookup::reference::ReferenceDatabase;
    use crate::lookup::watchlist::WatchlistStore;
    use crate::registry::Lookups;
    use crate::transport::testing::RecordingTransport;
    use crate::transport::Topics;
    use std::sync::Arc;
    use tokio::sync::watch;

    #[test]
    fn test_parse_watch_add_keeps_whole_message() {
        let cmd = RemoteCommand::parse("watch_add abc123 Air Force   One").unwrap();
        assert_eq!(
            cmd,
            RemoteCommand::WatchAdd {
                key: MatchKey::Identifier,
                value: "ABC123".to_string(),
                display_message: "Air Force One".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_mark_commands() {
        assert_eq!(
            RemoteCommand::parse("watch_remove_mark g-abcd").unwrap(),
            RemoteCommand::WatchRemove { key: MatchKey::Mark, value: "G-ABCD".to_string() }
        );
        assert!(matches!(
            RemoteCommand::parse("watch_add_mark G-ABCD Tail").unwrap(),
            RemoteCommand::WatchAdd { key: MatchKey::Mark, .. }
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(RemoteCommand::parse("   "), Err(CommandError::Empty));
        assert_eq!(
            RemoteCommand::parse("Adding to watchlist"),
            Err(CommandError::Unknown("Adding".to_string()))
        );
        assert!(matches!(RemoteCommand::parse("watch_add ABC123"), Err(CommandError::Usage(_))));
        assert!(matches!(RemoteCommand::parse("watch_remove"), Err(CommandError::Usage(_))));
        assert_eq!(
            RemoteCommand::parse("watch_add XYZ Nope"),
            Err(CommandError::InvalidIdentifier("XYZ".to_string()))
        );
        assert_eq!(RemoteCommand::parse("ping").unwrap(), RemoteCommand::Ping);
        assert_eq!(RemoteCommand::parse("db_update").unwrap(), RemoteCommand::DbUpdate);
    }

    #[test]
    fn test_replies_are_never_commands() {
        let replies = vec![
            "Adding to watchlist".to_string(),
            "Already on watchlist".to_string(),
            "Removing from watchlist".to_string(),
            "Not on watchlist".to_string(),
            "Updating Database".to_string(),
            "Pong".to_string(),
            CommandError::Usage("watch_remove <identifier>").to_string(),
            CommandError::InvalidIdentifier("XYZ".to_string()).to_string(),
        ];
        for reply in &replies {
            assert!(
                matches!(RemoteCommand::parse(reply), Err(CommandError::Unknown(_))),
                "reply {reply:?} parses as a command"
            );
        }
    }

    #[tokio::test]
    async fn test_run_applies_commands_and_replies() {
        let dir = tempfile::tempdir().unwrap();
        let store = WatchlistStore::open(dir.path().join("watchlist.jsonl")).unwrap();
        let (lookups_tx, lookups_rx) = watch::channel(Arc::new(Lookups::default()));
        let registry = RegistryHandle::spawn(
            store,
            ReferenceDatabase::empty(),
            ReferenceConfig::default(),
            lookups_tx,
        );

        let transport = Arc::new(RecordingTransport::default());
        let publisher = Publisher::new(transport.clone(), Topics::new("pi"));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(rx, registry.clone(), publisher, cancel.clone()));

        for payload in ["watch_add abcdef Spotted", "watch_add ABCDEF Again", "ping", "Pong"] {
            tx.send(payload.to_string()).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap().unwrap();

        assert_eq!(
            transport.on_topic("adsb/pi"),
            vec!["Adding to watchlist", "Already on watchlist", "Pong"]
        );
        assert!(lookups_rx.borrow().watchlist.contains(MatchKey::Identifier, "ABCDEF"));
        registry.shutdown().await.unwrap();
    }
}
