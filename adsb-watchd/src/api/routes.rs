use std::sync::Arc;
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use tokio::sync::watch;
use shared::alert_log::AlertCycleLog;
use crate::lookup::watchlist::WatchlistEntry;
use crate::registry::Lookups;

#[derive(Clone)]
pub struct AppState {
    pub alerts_rx: watch::Receiver<Arc<AlertCycleLog>>,
    pub lookups_rx: watch::Receiver<Arc<Lookups>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(get_health))
        .route("/v1/alerts", get(get_alerts))
        .route("/v1/watchlist", get(get_watchlist))
        .with_state(state)
}

async fn get_health() -> &'static str {
    "ok"
}

async fn get_alerts(State(state): State<AppState>) -> Json<AlertCycleLog> {
    let log = state.alerts_rx.borrow().clone();
    Json(log.as_ref().clone())
}

async fn get_watchlist(State(state): State<AppState>) -> Json<Vec<WatchlistEntry>> {
    let lookups = state.lookups_rx.borrow().clone();
    Json(lookups.watchlist.entries().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::{AlertVerdict, Identifier};

    fn state() -> (AppState, watch::Sender<Arc<AlertCycleLog>>, watch::Sender<Arc<Lookups>>) {
        let (alerts_tx, alerts_rx) =
            watch::channel(Arc::new(AlertCycleLog { written_at: 0.0, entries: vec![] }));
        let (lookups_tx, lookups_rx) = watch::channel(Arc::new(Lookups::default()));
        (AppState { alerts_rx, lookups_rx }, alerts_tx, lookups_tx)
    }

    #[tokio::test]
    async fn test_alerts_reflect_latest_cycle() {
        let (state, alerts_tx, _lookups_tx) = state();
        alerts_tx.send_replace(Arc::new(AlertCycleLog {
            written_at: 42.0,
            entries: vec![AlertVerdict {
                identifier: Identifier::new("abcdef"),
                reasons: vec![],
                message: String::new(),
                display_label: None,
                squawk: None,
                flight_number: None,
                reference: None,
            }],
        }));

        let Json(log) = get_alerts(State(state)).await;
        assert_eq!(log.written_at, 42.0);
        assert_eq!(log.entries[0].identifier.as_str(), "ABCDEF");
    }

    #[tokio::test]
    async fn test_watchlist_starts_empty() {
        let (state, _alerts_tx, _lookups_tx) = state();
        let Json(entries) = get_watchlist(State(state)).await;
        assert!(entries.is_empty());
    }
}
