//! Typed channel for UI notifications
//!
//! The front end (GUI, remote shell, whatever is attached) consumes
//! these instead of calling into the core. Payloads are `Serialize` so a
//! transport can forward them verbatim. Uses a bounded mpsc channel with
//! `try_send` so the search loops never block on a slow consumer.

use crate::domain::types::{Aisle, SearchOutcome, SearchSummary};
use crate::infra::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Messages surfaced to the UI boundary
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ItemFound(ItemFoundPayload),
    SearchComplete(SearchCompletePayload),
    SearchFailed(SearchFailedPayload),
    CartChanged(CartChangedPayload),
}

/// A wanted item was detected and checked off
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFoundPayload {
    pub item: String,
    pub aisle: Aisle,
}

/// A run reached a terminal Completed state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchCompletePayload {
    pub run_id: String,
    pub outcome: SearchOutcome,
    pub summary: SearchSummary,
}

/// A run ended in Failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchFailedPayload {
    pub run_id: String,
    pub reason: String,
}

/// The wanted-item list changed (user add/remove or auto-removal)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartChangedPayload {
    pub items: Vec<String>,
}

/// Non-blocking sender handed to the search loops and the controller
#[derive(Clone)]
pub struct NotifierSender {
    tx: mpsc::Sender<Notification>,
    metrics: Arc<Metrics>,
}

impl NotifierSender {
    pub fn item_found(&self, item: &str, aisle: Aisle) {
        self.send(Notification::ItemFound(ItemFoundPayload { item: item.to_string(), aisle }));
    }

    pub fn search_complete(&self, run_id: &str, outcome: SearchOutcome, summary: SearchSummary) {
        self.send(Notification::SearchComplete(SearchCompletePayload {
            run_id: run_id.to_string(),
            outcome,
            summary,
        }));
    }

    pub fn search_failed(&self, run_id: &str, reason: &str) {
        self.send(Notification::SearchFailed(SearchFailedPayload {
            run_id: run_id.to_string(),
            reason: reason.to_string(),
        }));
    }

    pub fn cart_changed(&self, items: Vec<String>) {
        self.send(Notification::CartChanged(CartChangedPayload { items }));
    }

    fn send(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                self.metrics.record_notification_dropped();
                warn!(kind = %kind_of(&n), "notification_dropped: channel full");
            }
            Err(TrySendError::Closed(n)) => {
                debug!(kind = %kind_of(&n), "notification_channel_closed");
            }
        }
    }
}

fn kind_of(notification: &Notification) -> &'static str {
    match notification {
        Notification::ItemFound(_) => "item_found",
        Notification::SearchComplete(_) => "search_complete",
        Notification::SearchFailed(_) => "search_failed",
        Notification::CartChanged(_) => "cart_changed",
    }
}

/// Create the notification channel
pub fn create_notifier(
    capacity: usize,
    metrics: Arc<Metrics>,
) -> (NotifierSender, mpsc::Receiver<Notification>) {
    let (tx, rx) = mpsc::channel(capacity);
    (NotifierSender { tx, metrics }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_found_roundtrip() {
        let (sender, mut rx) = create_notifier(8, Arc::new(Metrics::new()));
        sender.item_found("Coke", Aisle(2));

        match rx.try_recv().unwrap() {
            Notification::ItemFound(payload) => {
                assert_eq!(payload.item, "Coke");
                assert_eq!(payload.aisle, Aisle(2));
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[test]
    fn test_full_channel_drops_and_counts() {
        let metrics = Arc::new(Metrics::new());
        let (sender, _rx) = create_notifier(1, metrics.clone());
        sender.cart_changed(vec!["Coke".to_string()]);
        sender.cart_changed(vec!["Coke".to_string(), "Pepsi".to_string()]);

        let report = metrics.report();
        assert_eq!(report.notifications_dropped, 1);
    }

    #[test]
    fn test_payloads_serialize() {
        let payload = SearchCompletePayload {
            run_id: "0190-run".to_string(),
            outcome: SearchOutcome::AllFound,
            summary: SearchSummary::default(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"all_found\""));
    }
}
