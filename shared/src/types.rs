use std::fmt;
use serde::{Serialize, Deserialize};

/// 24-bit transponder code, stored as canonical upper-case hex.
/// Every construction path (including deserialization) normalizes case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a bare six digit hex code. Non-ICAO addresses such as
    /// TIS-B "~1A2B3C" are accepted from the feed but are not canonical.
    pub fn is_canonical(&self) -> bool {
        self.0.len() == 6 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl From<String> for Identifier {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Identifier {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One currently visible aircraft, as reported by the telemetry feed.
/// Only the identifier survives from one cycle to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftSnapshotEntry {
    #[serde(rename = "hex")]
    pub identifier: Identifier,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub squawk: Option<String>,

    #[serde(rename = "flight", default, skip_serializing_if = "Option::is_none")]
    pub flight_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,

    /// Remaining feed fields (altitude, speed, rssi, ...) carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AircraftSnapshotEntry {
    pub fn new(identifier: impl Into<Identifier>) -> Self {
        Self {
            identifier: identifier.into(),
            squawk: None,
            flight_number: None,
            lat: None,
            lon: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// The feed document read once per polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Feed-side wall clock, when the feed provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<f64>,

    #[serde(default)]
    pub aircraft: Vec<AircraftSnapshotEntry>,
}

/// Static reference data for one airframe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub registration_mark: Option<String>,

    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub type_code: Option<String>,

    /// Flag bit string; position 0 is the military flag
    #[serde(rename = "f", default)]
    pub flags: String,

    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ReferenceRecord {
    pub fn is_military(&self) -> bool {
        self.flags.starts_with('1')
    }
}

/// Why an aircraft is alerting. Declaration order is rule-evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertReason {
    Watchlist,
    SpecialSquawk,
    MilitaryFlag,
}

impl AlertReason {
    pub fn label(&self) -> &'static str {
        match self {
            AlertReason::Watchlist => "WATCHLIST ALERT",
            AlertReason::SpecialSquawk => "SQUAWK ALERT",
            AlertReason::MilitaryFlag => "MILITARY FLAG",
        }
    }
}

/// Classification result for one aircraft in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertVerdict {
    #[serde(rename = "hex")]
    pub identifier: Identifier,

    #[serde(default)]
    pub reasons: Vec<AlertReason>,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub squawk: Option<String>,

    #[serde(rename = "flight", default, skip_serializing_if = "Option::is_none")]
    pub flight_number: Option<String>,

    /// Attached whenever a record exists, whichever rule fired
    #[serde(rename = "db-record", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceRecord>,
}

impl AlertVerdict {
    pub fn is_alerting(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn registration_mark(&self) -> Option<&str> {
        self.reference
            .as_ref()
            .and_then(|r| r.registration_mark.as_deref())
    }
}
