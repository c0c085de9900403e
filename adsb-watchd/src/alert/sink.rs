use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use shared::alert_log::{parse_header, split_header, AlertCycleLog};
use shared::types::{AlertVerdict, Identifier};
use crate::atomic::write_atomic;
use crate::transport::{Publisher, Qos};

/// Smallest step used to keep log headers strictly increasing.
const HEADER_STEP_SECS: f64 = 0.001;

/// Append-only, human readable record of novel alerts and alert-path errors.
pub struct AlertHistory {
    path: PathBuf,
}

impl AlertHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, now: f64, title: &str, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "[{}][{}] {}", now, title, content)
    }

    pub fn alert(&self, verdict: &AlertVerdict, now: f64) {
        let line = match verdict.registration_mark() {
            Some(mark) => format!("{} {} {}", verdict.identifier, mark, verdict.message),
            None => format!("{} {}", verdict.identifier, verdict.message),
        };
        if let Err(e) = self.append(now, "ALERT", &line) {
            tracing::warn!("Failed to append alert history {}: {}", self.path.display(), e);
        }
    }

    pub fn error(&self, message: &str, now: f64) {
        if let Err(e) = self.append(now, "ERROR", message) {
            tracing::warn!("Failed to append alert history {}: {}", self.path.display(), e);
        }
    }
}

/// Writes the per-cycle alert log and pushes alerts to the transport.
pub struct AlertSink {
    log_path: PathBuf,
    history: AlertHistory,
    publisher: Option<Publisher>,
    last_written: f64,
}

impl AlertSink {
    /// Headers continue from the log left by a previous run, if readable.
    pub fn new(log_path: impl Into<PathBuf>, history: AlertHistory, publisher: Option<Publisher>) -> Self {
        let log_path = log_path.into();
        let last_written = previous_header(&log_path).unwrap_or(f64::MIN);
        Self {
            log_path,
            history,
            publisher,
            last_written,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Replace the alert log with this cycle's alerting verdicts, record and
    /// push the novel ones, then push the whole cycle. Only a failed log
    /// write is returned as an error, after the pushes have been attempted.
    pub fn write_cycle(
        &mut self,
        verdicts: &[AlertVerdict],
        novel: &BTreeSet<Identifier>,
        now: f64,
    ) -> Result<AlertCycleLog> {
        let written_at = if now > self.last_written {
            now
        } else {
            self.last_written + HEADER_STEP_SECS
        };
        self.last_written = written_at;

        let log = AlertCycleLog {
            written_at,
            entries: verdicts.iter().filter(|v| v.is_alerting()).cloned().collect(),
        };
        let write_result = self.write_log(&log);

        for verdict in log.entries.iter().filter(|v| novel.contains(&v.identifier)) {
            tracing::warn!("New alert: {} {}", verdict.identifier, verdict.message);
            self.history.alert(verdict, now);
            self.publish_novel(verdict, now);
        }

        if let Some(publisher) = &self.publisher {
            match serde_json::to_string(&log) {
                Ok(payload) => {
                    publisher.publish(&publisher.topics().alerts(), &payload, Qos::AtLeastOnce);
                }
                Err(e) => tracing::error!("Failed to serialize alert cycle: {}", e),
            }
        }

        write_result.map(|_| log)
    }

    fn write_log(&self, log: &AlertCycleLog) -> Result<()> {
        let contents = log.encode().context("Failed to encode alert log")?;
        write_atomic(&self.log_path, contents.as_bytes())
            .with_context(|| format!("Failed to write alert log {}", self.log_path.display()))
    }

    fn publish_novel(&self, verdict: &AlertVerdict, now: f64) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let published = serde_json::to_string(verdict)
            .map(|payload| publisher.publish(&publisher.topics().novel_alert(), &payload, Qos::AtLeastOnce))
            .unwrap_or(false);
        if !published {
            self.history
                .error(&format!("Alert Publish Error {}", verdict.identifier), now);
        }
    }
}

fn previous_header(path: &Path) -> Option<f64> {
    let text = std::fs::read_to_string(path).ok()?;
    let (header, _) = split_header(&text).ok()?;
    parse_header(header).ok()
}
