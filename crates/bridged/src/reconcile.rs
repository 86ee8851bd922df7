use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::alert::AlertSink;
use crate::error::Result;
use crate::store::Store;

/// Garbage collector for reservations, with a safety bias: a reservation is
/// freed only when the mirror proves its transaction confirmed. Stale
/// reservations raise an operator alert but keep suppressing balance —
/// deleting on a timeout guess would re-open a double-spend window.
pub struct Reconciler {
    store: Store,
    alerts: Arc<dyn AlertSink>,
    stale_after: Duration,
}

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    /// Reservations deleted because their transaction confirmed.
    pub freed: usize,
    /// Unconfirmed reservations past the staleness threshold (kept).
    pub stale: usize,
    /// Unconfirmed reservations still within the window.
    pub kept: usize,
}

impl Reconciler {
    pub fn new(store: Store, alerts: Arc<dyn AlertSink>, stale_after_hours: i64) -> Self {
        Self {
            store,
            alerts,
            stale_after: Duration::hours(stale_after_hours),
        }
    }

    pub async fn reconcile(&self, token: &str) -> Result<ReconcileSummary> {
        let reservations = self.store.reservations_for_token(token).await?;
        let now = Utc::now();
        let mut summary = ReconcileSummary::default();

        for reservation in reservations {
            if self
                .store
                .transaction_confirmed(&reservation.transaction_id)
                .await?
            {
                self.store.delete_reservation(reservation.id).await?;
                info!(
                    "Freed reservation for withdrawal {}: transaction {} confirmed on-chain",
                    reservation.withdrawal_id, reservation.transaction_id
                );
                summary.freed += 1;
            } else if now - reservation.created_at > self.stale_after {
                summary.stale += 1;
                let age_hours = (now - reservation.created_at).num_hours();
                warn!(
                    "Reservation for withdrawal {} unconfirmed for {}h, keeping it and alerting",
                    reservation.withdrawal_id, age_hours
                );
                let message = format!(
                    "Unconfirmed withdrawal reservation older than {}h: \
                     token={}, withdrawal_id={}, transaction_id={}, customer={}, amount={}",
                    self.stale_after.num_hours(),
                    reservation.token,
                    reservation.withdrawal_id,
                    reservation.transaction_id,
                    reservation.customer_address,
                    reservation.amount
                );
                if let Err(e) = self.alerts.publish(&message).await {
                    warn!("Failed to publish stale-reservation alert: {}", e);
                }
            } else {
                summary.kept += 1;
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::testutil::RecordingSink;
    use crate::store::testutil::*;
    use crate::store::{insert_reservation, NewReservation};
    use rust_decimal_macros::dec;

    async fn reserve(store: &Store, withdrawal_id: i64, txid: &str) {
        let mut conn = store.pool().acquire().await.unwrap();
        insert_reservation(
            &mut conn,
            &NewReservation {
                token: "DFI",
                withdrawal_id,
                transaction_id: txid,
                customer_address: "dCust",
                amount: dec!(150),
            },
        )
        .await
        .unwrap();
    }

    async fn fixture() -> (Store, Arc<RecordingSink>, Reconciler) {
        let store = memory_store().await;
        let sink = Arc::new(RecordingSink::default());
        let reconciler = Reconciler::new(store.clone(), sink.clone(), 24);
        (store, sink, reconciler)
    }

    #[tokio::test]
    async fn confirmed_reservation_is_freed_without_alert() {
        let (store, sink, reconciler) = fixture().await;
        reserve(&store, 1, "tx-1").await;
        backdate_reservations(&store, 72).await;
        seed_confirmed(&store, "tx-1").await;

        let summary = reconciler.reconcile("DFI").await.unwrap();
        assert_eq!(summary.freed, 1);
        assert_eq!(summary.stale, 0);
        assert_eq!(reservation_count(&store).await, 0);
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_reservation_is_kept_and_alerted_once() {
        let (store, sink, reconciler) = fixture().await;
        reserve(&store, 1, "tx-1").await;
        backdate_reservations(&store, 25).await;

        let summary = reconciler.reconcile("DFI").await.unwrap();
        assert_eq!(summary.stale, 1);
        assert_eq!(summary.freed, 0);
        assert_eq!(reservation_count(&store).await, 1);

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("token=DFI"));
        assert!(messages[0].contains("withdrawal_id=1"));
        assert!(messages[0].contains("transaction_id=tx-1"));
        assert!(messages[0].contains("customer=dCust"));
        assert!(messages[0].contains("amount=150.00000000"));
    }

    #[tokio::test]
    async fn young_reservation_is_left_untouched() {
        let (store, sink, reconciler) = fixture().await;
        reserve(&store, 1, "tx-1").await;
        backdate_reservations(&store, 23).await;

        let summary = reconciler.reconcile("DFI").await.unwrap();
        assert_eq!(summary.kept, 1);
        assert_eq!(summary.stale, 0);
        assert_eq!(summary.freed, 0);
        assert_eq!(reservation_count(&store).await, 1);
        assert!(sink.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_tokens_are_not_touched() {
        let (store, _sink, reconciler) = fixture().await;
        reserve(&store, 1, "tx-1").await;
        seed_confirmed(&store, "tx-1").await;

        let summary = reconciler.reconcile("BTC").await.unwrap();
        assert_eq!(summary.freed, 0);
        assert_eq!(reservation_count(&store).await, 1);
    }
}
