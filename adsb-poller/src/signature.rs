use sha2::{Digest, Sha256};
use shared::types::Identifier;

/// SHA-256 of an alerting-identifier set. Identifiers are sorted and
/// deduplicated first so the signature does not depend on log order.
pub fn cycle_signature<'a>(identifiers: impl IntoIterator<Item = &'a Identifier>) -> String {
    let mut ids: Vec<&str> = identifiers.into_iter().map(Identifier::as_str).collect();
    ids.sort_unstable();
    ids.dedup();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
