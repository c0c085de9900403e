use std::process::Command;
use anyhow::{bail, Context, Result};
use shared::types::AlertVerdict;

pub const SUMMARY_TITLE: &str = "ADSB Alert";

/// One consolidated notification for every currently alerting aircraft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSummary {
    pub title: String,
    pub lines: Vec<String>,
}

impl AlertSummary {
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

/// `IDENT [squawk CODE] [MARK] message`, one line per aircraft.
pub fn render_summary(entries: &[AlertVerdict]) -> AlertSummary {
    let lines = entries
        .iter()
        .map(|verdict| {
            let mut parts = vec![verdict.identifier.to_string()];
            if let Some(squawk) = &verdict.squawk {
                parts.push(format!("squawk {}", squawk));
            }
            if let Some(mark) = verdict.registration_mark() {
                parts.push(mark.to_string());
            }
            if !verdict.message.is_empty() {
                parts.push(verdict.message.clone());
            }
            parts.join(" ")
        })
        .collect();

    AlertSummary {
        title: SUMMARY_TITLE.to_string(),
        lines,
    }
}

pub trait Notifier {
    fn notify(&self, summary: &AlertSummary) -> Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, summary: &AlertSummary) -> Result<()> {
        (**self).notify(summary)
    }
}

/// Desktop popup through `notify-send`.
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, summary: &AlertSummary) -> Result<()> {
        let body = summary.body();
        let status = Command::new("notify-send")
            .args(["--urgency", "critical", "--app-name", "adsb-poller", summary.title.as_str(), body.as_str()])
            .status()
            .context("Failed to run notify-send")?;
        if !status.success() {
            bail!("notify-send exited with {}", status);
        }
        Ok(())
    }
}

/// Headless hosts: the summary only goes to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, summary: &AlertSummary) -> Result<()> {
        tracing::warn!("{}\n{}", summary.title, summary.body());
        Ok(())
    }
}
