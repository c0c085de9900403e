use std::collections::BTreeSet;
use shared::types::Identifier;

/// Split of this cycle's alerting identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Alerting now, not alerting in the immediately preceding cycle
    pub novel: BTreeSet<Identifier>,
    /// Alerting now and in the preceding cycle
    pub continuing: BTreeSet<Identifier>,
}

pub fn dedup(current: &BTreeSet<Identifier>, previous: &BTreeSet<Identifier>) -> DedupOutcome {
    let (continuing, novel) = current
        .iter()
        .cloned()
        .partition(|id| previous.contains(id));
    DedupOutcome { novel, continuing }
}

/// Cycle-over-cycle novelty. Only the previous cycle is remembered, so an
/// aircraft that drops out for one cycle is novel again when it returns.
#[derive(Debug, Default)]
pub struct AlertDeduplicator {
    previous: BTreeSet<Identifier>,
}

impl AlertDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare against the previous cycle, then make `current` the previous.
    pub fn observe(&mut self, current: BTreeSet<Identifier>) -> DedupOutcome {
        let outcome = dedup(&current, &self.previous);
        self.previous = current;
        outcome
    }

    pub fn previous(&self) -> &BTreeSet<Identifier> {
        &self.previous
    }
}
