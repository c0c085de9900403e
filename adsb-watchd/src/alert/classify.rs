use shared::protocol::{canonical_squawk, special_squawk};
use shared::types::{AircraftSnapshotEntry, AlertReason, AlertVerdict, TelemetrySnapshot};
use crate::lookup::reference::ReferenceDatabase;
use crate::lookup::watchlist::Watchlist;

/// Rules run watchlist, special squawk, military flag; each that fires
/// appends its reason and a bracketed fragment.
pub fn classify(
    entry: &AircraftSnapshotEntry,
    watchlist: &Watchlist,
    reference: &ReferenceDatabase,
) -> AlertVerdict {
    let record = reference.get(&entry.identifier);
    let mut reasons = Vec::new();
    let mut message = String::new();
    let mut display_label = None;

    if let Some(hit) = watchlist.find(&entry.identifier, record) {
        push_fragment(&mut message, AlertReason::Watchlist, Some(&hit.display_message));
        reasons.push(AlertReason::Watchlist);
        display_label = Some(hit.display_message.clone());
    }

    if let Some(raw) = entry.squawk.as_deref() {
        if let (Some(code), Some(meaning)) = (canonical_squawk(raw), special_squawk(raw)) {
            push_fragment(
                &mut message,
                AlertReason::SpecialSquawk,
                Some(&format!("{} ({})", code, meaning)),
            );
            reasons.push(AlertReason::SpecialSquawk);
        }
    }

    if record.is_some_and(|r| r.is_military()) {
        push_fragment(&mut message, AlertReason::MilitaryFlag, None);
        reasons.push(AlertReason::MilitaryFlag);
    }

    AlertVerdict {
        identifier: entry.identifier.clone(),
        reasons,
        message,
        display_label,
        squawk: entry.squawk.clone(),
        flight_number: entry.flight_number.as_deref().map(|f| f.trim().to_string()),
        reference: record.cloned(),
    }
}

/// One verdict per aircraft, in feed order.
pub fn classify_snapshot(
    snapshot: &TelemetrySnapshot,
    watchlist: &Watchlist,
    reference: &ReferenceDatabase,
) -> Vec<AlertVerdict> {
    snapshot
        .aircraft
        .iter()
        .map(|entry| classify(entry, watchlist, reference))
        .collect()
}

fn push_fragment(message: &mut String, reason: AlertReason, detail: Option<&str>) {
    match detail {
        Some(detail) => message.push_str(&format!("[{}: {}]", reason.label(), detail)),
        None => message.push_str(&format!("[{}]", reason.label())),
    }
}
