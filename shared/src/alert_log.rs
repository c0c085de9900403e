use std::collections::BTreeSet;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::types::{AlertVerdict, Identifier};

#[derive(Debug, Error)]
pub enum LogParseError {
    #[error("alert log is empty")]
    Empty,

    #[error("invalid header timestamp {0:?}")]
    Header(String),

    #[error("invalid alert record on line {line}: {source}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Header line is the producer clock in fractional unix seconds, then one
/// JSON verdict per alerting aircraft. Replaced whole every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCycleLog {
    pub written_at: f64,
    pub entries: Vec<AlertVerdict>,
}

impl AlertCycleLog {
    /// Render the file form: header line, then one record per line.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut out = format!("{}\n", self.written_at);
        for entry in &self.entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse a whole log in one go.
    pub fn parse(text: &str) -> Result<Self, LogParseError> {
        let (header, body) = split_header(text)?;
        let written_at = parse_header(header)?;
        let entries = parse_entries(body)?;
        Ok(Self { written_at, entries })
    }

    pub fn identifiers(&self) -> BTreeSet<Identifier> {
        self.entries.iter().map(|e| e.identifier.clone()).collect()
    }

    /// Signed age of the log relative to `now`, in seconds.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        unix_seconds(now) - self.written_at
    }
}

/// Split off the header line. Leading blank lines are skipped.
pub fn split_header(text: &str) -> Result<(&str, &str), LogParseError> {
    let text = text.trim_start();
    if text.is_empty() {
        return Err(LogParseError::Empty);
    }
    Ok(match text.split_once('\n') {
        Some((header, body)) => (header, body),
        None => (text, ""),
    })
}

pub fn parse_header(line: &str) -> Result<f64, LogParseError> {
    let line = line.trim();
    match line.parse::<f64>() {
        Ok(ts) if ts.is_finite() => Ok(ts),
        _ => Err(LogParseError::Header(line.to_string())),
    }
}

/// Parse the record lines that follow the header. Blank lines are ignored.
pub fn parse_entries(body: &str) -> Result<Vec<AlertVerdict>, LogParseError> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| LogParseError::Record {
                line: idx + 2,
                source,
            })
        })
        .collect()
}

/// Fractional unix seconds, the header timestamp unit.
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertReason, ReferenceRecord};

    fn verdict(hex: &str) -> AlertVerdict {
        AlertVerdict {
            identifier: Identifier::new(hex),
            reasons: vec![AlertReason::SpecialSquawk],
            message: "[SQUAWK ALERT: 7700 (general emergency)]".to_string(),
            display_label: None,
            squawk: Some("7700".to_string()),
            flight_number: None,
            reference: Some(ReferenceRecord {
                registration_mark: Some("G-ABCD".to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_encode_then_parse() {
        let log = AlertCycleLog {
            written_at: 1_700_000_000.25,
            entries: vec![verdict("abcdef"), verdict("123456")],
        };
        let text = log.encode().unwrap();
        assert!(text.starts_with("1700000000.25\n"));
        assert_eq!(text.lines().count(), 3);

        let parsed = AlertCycleLog::parse(&text).unwrap();
        assert_eq!(parsed, log);
        assert_eq!(parsed.entries[0].registration_mark(), Some("G-ABCD"));
    }

    #[test]
    fn test_header_only_log_has_no_entries() {
        let parsed = AlertCycleLog::parse("1700000000.0\n").unwrap();
        assert!(parsed.entries.is_empty());
        assert!(parsed.identifiers().is_empty());
    }

    #[test]
    fn test_empty_log() {
        assert!(matches!(AlertCycleLog::parse(""), Err(LogParseError::Empty)));
        assert!(matches!(AlertCycleLog::parse("\n  \n"), Err(LogParseError::Empty)));
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(AlertCycleLog::parse("yesterday\n"), Err(LogParseError::Header(_))));
        assert!(matches!(AlertCycleLog::parse("NaN\n"), Err(LogParseError::Header(_))));
    }

    #[test]
    fn test_bad_record_reports_line() {
        let err = AlertCycleLog::parse("1700000000.0\n{\"hex\":\"ABCDEF\"}\n{not json\n").unwrap_err();
        match err {
            LogParseError::Record { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_age() {
        let log = AlertCycleLog { written_at: 1_700_000_000.0, entries: vec![] };
        let now = DateTime::from_timestamp(1_700_000_015, 0).unwrap();
        assert_eq!(log.age_secs(now), 15.0);
    }
}
