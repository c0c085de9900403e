use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use chrono::{DateTime, Utc};
use shared::alert_log::{parse_entries, parse_header, split_header, unix_seconds, LogParseError};
use shared::types::Identifier;
use crate::config::Config;
use crate::notify::{render_summary, Notifier};
use crate::session::{Connector, RemoteShell};
use crate::signature::cycle_signature;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub log_command: String,
    pub interval: Duration,
    pub backoff: Duration,
    pub freshness_threshold_secs: f64,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_command: config.remote.log_command(),
            interval: Duration::from_secs(config.poll.interval_secs),
            backoff: Duration::from_secs(config.poll.backoff_secs),
            freshness_threshold_secs: config.poll.freshness_threshold_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Fresh { notified: bool },
    /// Producer clock minus ours, in seconds
    Stale { skew_secs: f64 },
    Empty,
    ParseError(String),
}

/// Result of one [`AlertPoller::step`]: what happened, and how long to
/// wait before the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub outcome: Option<PollOutcome>,
    pub delay: Duration,
}

pub enum PollerState<S> {
    Disconnected,
    Connected(S),
}

/// Identifiers the poller last notified about, each mapped to the
/// signature of the cycle it was notified in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSeenSet {
    seen: BTreeMap<Identifier, String>,
}

impl RemoteSeenSet {
    pub fn matches(&self, current: &BTreeSet<Identifier>) -> bool {
        self.seen.keys().eq(current.iter())
    }

    /// Replace the contents with `current`. Returns the cycle signature.
    pub fn replace(&mut self, current: &BTreeSet<Identifier>) -> String {
        let signature = cycle_signature(current);
        self.seen = current
            .iter()
            .map(|id| (id.clone(), signature.clone()))
            .collect();
        signature
    }

    pub fn signature_of(&self, identifier: &Identifier) -> Option<&str> {
        self.seen.get(identifier).map(String::as_str)
    }

    pub fn identifiers(&self) -> BTreeSet<Identifier> {
        self.seen.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

pub struct AlertPoller<C: Connector, N> {
    connector: C,
    notifier: N,
    settings: PollSettings,
    state: PollerState<C::Shell>,
    seen: RemoteSeenSet,
}

impl<C: Connector, N: Notifier> AlertPoller<C, N> {
    pub fn new(connector: C, notifier: N, settings: PollSettings) -> Self {
        Self {
            connector,
            notifier,
            settings,
            state: PollerState::Disconnected,
            seen: RemoteSeenSet::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, PollerState::Connected(_))
    }

    pub fn seen(&self) -> &RemoteSeenSet {
        &self.seen
    }

    /// Advance the state machine by one transition. Blocks for at most
    /// the session timeout. `clock` is read once the log has arrived.
    pub fn step(&mut self, clock: impl FnOnce() -> DateTime<Utc>) -> Step {
        match std::mem::replace(&mut self.state, PollerState::Disconnected) {
            PollerState::Disconnected => match self.connector.connect() {
                Ok(shell) => {
                    self.state = PollerState::Connected(shell);
                    Step { outcome: None, delay: Duration::ZERO }
                }
                Err(e) => {
                    tracing::warn!("Connection failed, retrying in {:?}: {}", self.settings.backoff, e);
                    Step { outcome: None, delay: self.settings.backoff }
                }
            },
            PollerState::Connected(mut shell) => match shell.exec(&self.settings.log_command) {
                Ok(output) => {
                    self.state = PollerState::Connected(shell);
                    let outcome = self.evaluate(&output, clock());
                    let delay = self.delay_for(&outcome);
                    Step { outcome: Some(outcome), delay }
                }
                Err(e) => {
                    tracing::warn!("Session lost, reconnecting: {}", e);
                    shell.close();
                    Step { outcome: None, delay: self.settings.backoff }
                }
            },
        }
    }

    /// Apply the validity gates to one fetched log, in order: empty,
    /// header, staleness, records. Only a log passing all of them
    /// touches the seen set.
    pub fn evaluate(&mut self, output: &str, now: DateTime<Utc>) -> PollOutcome {
        let (header, body) = match split_header(output) {
            Ok(parts) => parts,
            Err(LogParseError::Empty) => {
                tracing::warn!("Alert log is empty");
                return PollOutcome::Empty;
            }
            Err(e) => return PollOutcome::ParseError(e.to_string()),
        };

        let written_at = match parse_header(header) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!("Skipping poll: {}", e);
                return PollOutcome::ParseError(e.to_string());
            }
        };

        let skew_secs = written_at - unix_seconds(now);
        if skew_secs.abs() > self.settings.freshness_threshold_secs {
            tracing::warn!("Alert log is stale ({:.1}s skew), producer may be down", skew_secs);
            return PollOutcome::Stale { skew_secs };
        }

        let entries = match parse_entries(body) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Skipping poll: {}", e);
                return PollOutcome::ParseError(e.to_string());
            }
        };

        let current: BTreeSet<Identifier> = entries.iter().map(|e| e.identifier.clone()).collect();
        if self.seen.matches(&current) {
            return PollOutcome::Fresh { notified: false };
        }

        let signature = self.seen.replace(&current);
        if current.is_empty() {
            tracing::info!("All alerts cleared");
            return PollOutcome::Fresh { notified: false };
        }

        tracing::info!("{} alerting aircraft, cycle {}", current.len(), &signature[..12]);
        let notified = match self.notifier.notify(&render_summary(&entries)) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Notification failed: {:#}", e);
                false
            }
        };
        PollOutcome::Fresh { notified }
    }

    fn delay_for(&self, outcome: &PollOutcome) -> Duration {
        match outcome {
            PollOutcome::Fresh { .. } | PollOutcome::ParseError(_) => self.settings.interval,
            PollOutcome::Stale { .. } | PollOutcome::Empty => self.settings.backoff,
        }
    }

    /// Close the session, if any.
    pub fn shutdown(&mut self) {
        if let PollerState::Connected(mut shell) =
            std::mem::replace(&mut self.state, PollerState::Disconnected)
        {
            shell.close();
        }
    }
}
