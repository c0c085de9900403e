use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use shared::alert_log::{unix_seconds, AlertCycleLog};
use shared::types::{AlertVerdict, Identifier, TelemetrySnapshot};
use crate::alert::classify::classify_snapshot;
use crate::alert::dedup::AlertDeduplicator;
use crate::alert::sink::AlertSink;
use crate::config::FeedConfig;
use crate::registry::Lookups;
use crate::transport::{Publisher, Qos};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub aircraft: usize,
    pub novel: BTreeSet<Identifier>,
    pub continuing: BTreeSet<Identifier>,
}

/// One monitoring cycle end to end: classify, dedup, write, publish.
pub struct Monitor {
    lookups_rx: watch::Receiver<Arc<Lookups>>,
    dedup: AlertDeduplicator,
    sink: AlertSink,
    publisher: Option<Publisher>,
    alerts_tx: watch::Sender<Arc<AlertCycleLog>>,
}

impl Monitor {
    pub fn new(
        lookups_rx: watch::Receiver<Arc<Lookups>>,
        sink: AlertSink,
        publisher: Option<Publisher>,
        alerts_tx: watch::Sender<Arc<AlertCycleLog>>,
    ) -> Self {
        Self {
            lookups_rx,
            dedup: AlertDeduplicator::new(),
            sink,
            publisher,
            alerts_tx,
        }
    }

    /// Liveness beacon, published before the feed is read
    pub fn heartbeat(&self, now: f64) {
        if let Some(publisher) = &self.publisher {
            publisher.publish(&publisher.topics().alive(), &now.to_string(), Qos::AtLeastOnce);
        }
    }

    pub fn run_cycle(&mut self, snapshot: &TelemetrySnapshot, now: f64) -> CycleSummary {
        // One lookups snapshot for the whole cycle
        let lookups = self.lookups_rx.borrow().clone();

        if let Some(publisher) = &self.publisher {
            match serde_json::to_string(&snapshot.aircraft) {
                Ok(payload) => {
                    publisher.publish(&publisher.topics().tracking(), &payload, Qos::AtLeastOnce);
                }
                Err(e) => tracing::error!("Failed to serialize tracking snapshot: {}", e),
            }
        }

        let alerting: Vec<AlertVerdict> =
            classify_snapshot(snapshot, &lookups.watchlist, &lookups.reference)
                .into_iter()
                .filter(AlertVerdict::is_alerting)
                .collect();
        let outcome = self
            .dedup
            .observe(alerting.iter().map(|v| v.identifier.clone()).collect());

        match self.sink.write_cycle(&alerting, &outcome.novel, now) {
            Ok(log) => {
                self.alerts_tx.send_replace(Arc::new(log));
            }
            Err(e) => tracing::error!("Alert log not updated this cycle: {:#}", e),
        }

        CycleSummary {
            aircraft: snapshot.aircraft.len(),
            novel: outcome.novel,
            continuing: outcome.continuing,
        }
    }
}

pub async fn read_snapshot(path: &Path) -> Result<TelemetrySnapshot> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))
}

/// Fixed-period producer loop. A cycle that cannot read or parse the
/// snapshot is skipped whole; the next tick tries again.
pub async fn run(mut monitor: Monitor, feed: FeedConfig, cancel: CancellationToken) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(feed.poll_interval_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Starting monitor on {}", feed.snapshot_path.display());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = unix_seconds(Utc::now());
                monitor.heartbeat(now);

                match read_snapshot(&feed.snapshot_path).await {
                    Ok(snapshot) => {
                        let summary = monitor.run_cycle(&snapshot, now);
                        tracing::debug!(
                            "Cycle: {} aircraft, {} novel, {} continuing",
                            summary.aircraft,
                            summary.novel.len(),
                            summary.continuing.len()
                        );
                    }
                    Err(e) => tracing::warn!("Skipping cycle: {:#}", e),
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Monitor shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::{AircraftSnapshotEntry, AlertReason};
    use crate::alert::sink::AlertHistory;
    use crate::transport::testing::RecordingTransport;
    use crate::transport::Topics;

    struct Harness {
        _dir: tempfile::TempDir,
        log_path: std::path::PathBuf,
        monitor: Monitor,
        transport: Arc<RecordingTransport>,
        topics: Topics,
        alerts_rx: watch::Receiver<Arc<AlertCycleLog>>,
        _lookups_tx: watch::Sender<Arc<Lookups>>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("alerts.txt");
        let transport = Arc::new(RecordingTransport::default());
        let topics = Topics::new("pi");
        let publisher = Publisher::new(transport.clone(), topics.clone());
        let sink = AlertSink::new(
            &log_path,
            AlertHistory::new(dir.path().join("log.txt")),
            Some(publisher.clone()),
        );
        let (lookups_tx, lookups_rx) = watch::channel(Arc::new(Lookups::default()));
        let (alerts_tx, alerts_rx) =
            watch::channel(Arc::new(AlertCycleLog { written_at: 0.0, entries: vec![] }));

        Harness {
            _dir: dir,
            log_path,
            monitor: Monitor::new(lookups_rx, sink, Some(publisher), alerts_tx),
            transport,
            topics,
            alerts_rx,
            _lookups_tx: lookups_tx,
        }
    }

    fn emergency_snapshot() -> TelemetrySnapshot {
        let mut entry = AircraftSnapshotEntry::new("abcdef");
        entry.squawk = Some("7700".to_string());
        TelemetrySnapshot { now: None, aircraft: vec![entry, AircraftSnapshotEntry::new("123456")] }
    }

    #[test]
    fn test_emergency_is_novel_then_continuing() {
        let mut h = harness();
        let id = Identifier::new("ABCDEF");

        let first = h.monitor.run_cycle(&emergency_snapshot(), 100.0);
        assert_eq!(first.aircraft, 2);
        assert_eq!(first.novel, BTreeSet::from([id.clone()]));
        assert!(first.continuing.is_empty());

        let second = h.monitor.run_cycle(&emergency_snapshot(), 105.0);
        assert!(second.novel.is_empty());
        assert_eq!(second.continuing, BTreeSet::from([id.clone()]));

        // Exactly one push on the novel-alert subtopic across both cycles
        assert_eq!(h.transport.on_topic(&h.topics.novel_alert()).len(), 1);
        assert_eq!(h.transport.on_topic(&h.topics.tracking()).len(), 2);

        let log = AlertCycleLog::parse(&std::fs::read_to_string(&h.log_path).unwrap()).unwrap();
        assert_eq!(log.written_at, 105.0);
        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.entries[0].reasons, vec![AlertReason::SpecialSquawk]);
        assert_eq!(h.alerts_rx.borrow().written_at, 105.0);
    }

    #[test]
    fn test_quiet_cycle_clears_log() {
        let mut h = harness();
        h.monitor.run_cycle(&emergency_snapshot(), 100.0);
        h.monitor.run_cycle(&TelemetrySnapshot::default(), 105.0);

        let log = AlertCycleLog::parse(&std::fs::read_to_string(&h.log_path).unwrap()).unwrap();
        assert!(log.entries.is_empty());
    }

    #[test]
    fn test_heartbeat() {
        let h = harness();
        h.monitor.heartbeat(100.5);
        assert_eq!(h.transport.on_topic(&h.topics.alive()), vec!["100.5"]);
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aircraft.json");
        assert!(read_snapshot(&path).await.is_err());

        std::fs::write(&path, "{\"aircraft\": [").unwrap();
        assert!(read_snapshot(&path).await.is_err());

        std::fs::write(&path, r#"{"now": 1.0, "aircraft": [{"hex": "abcdef"}]}"#).unwrap();
        assert_eq!(read_snapshot(&path).await.unwrap().aircraft.len(), 1);
    }
}
