use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use stakebridge_sdk::amount::format_amount;
use stakebridge_sdk::{BalanceDecision, SignedWithdrawal};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::{self, NewReservation, Store};

/// Decides, for an ordered batch of signature-checked withdrawals, which are
/// covered by the customer's staking balance, and reserves approved amounts so
/// they cannot be promised twice.
pub struct BalanceChecker {
    store: Store,
    token: String,
    liquidity_address: String,
}

impl BalanceChecker {
    pub fn new(store: Store, token: &str, liquidity_address: &str) -> Self {
        Self {
            store,
            token: token.to_string(),
            liquidity_address: liquidity_address.to_string(),
        }
    }

    /// Current staking balance for a customer: `sum(vin) - sum(vout)` over the
    /// mirror, zero when the customer has no staking rows.
    #[allow(dead_code)]
    pub async fn available_balance(&self, customer_address: &str) -> Result<Decimal> {
        self.store
            .staking_balance(&self.liquidity_address, customer_address)
            .await
    }

    /// Check a batch in input order, approving or rejecting each item. The
    /// whole batch commits in one transaction: approvals granted earlier in
    /// the batch reduce what later items of the same customer may spend, and a
    /// failure mid-batch rolls every reservation back.
    pub async fn check_balances(
        &self,
        items: Vec<SignedWithdrawal>,
    ) -> Result<Vec<BalanceDecision>> {
        let mut tx = self.store.pool().begin().await?;
        let mut decisions = Vec::with_capacity(items.len());
        for item in items {
            let decision = self.check_one(&mut tx, item).await?;
            decisions.push(decision);
        }
        tx.commit().await?;
        Ok(decisions)
    }

    async fn check_one(
        &self,
        conn: &mut SqliteConnection,
        item: SignedWithdrawal,
    ) -> Result<BalanceDecision> {
        let withdrawal_id = item.withdrawal.id;
        let customer = item.withdrawal.customer_address.clone();
        let txid = item.decoded.txid.clone();
        let requested = item.withdrawal.amount;

        let reservation = NewReservation {
            token: &self.token,
            withdrawal_id,
            transaction_id: &txid,
            customer_address: &customer,
            amount: requested,
        };

        // A re-submitted withdrawal/transaction pair is already promised;
        // approving it again must not consume balance a second time.
        if store::reservation_exists(&mut *conn, &reservation).await? {
            debug!(
                "Withdrawal {} already reserved under txid {}, treating as approved",
                withdrawal_id, txid
            );
            return Ok(BalanceDecision::Approved(item.balance_checked(false)));
        }

        let ledger = store::staking_balance(&mut *conn, &self.liquidity_address, &customer).await?;
        let reserved = store::reserved_total(&mut *conn, &self.token, &customer).await?;
        let spendable = ledger - reserved;

        if requested <= spendable {
            store::insert_reservation(&mut *conn, &reservation).await?;
            info!(
                "Reserved {} {} for withdrawal {} (customer {}, spendable was {})",
                format_amount(requested),
                self.token,
                withdrawal_id,
                customer,
                format_amount(spendable)
            );
            Ok(BalanceDecision::Approved(item.balance_checked(true)))
        } else {
            warn!(
                "Withdrawal {} rejected: requested {} but spendable is {} (ledger {}, reserved {})",
                withdrawal_id,
                format_amount(requested),
                format_amount(spendable),
                format_amount(ledger),
                format_amount(reserved)
            );
            Ok(BalanceDecision::Rejected(item.reject_balance()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::*;
    use rust_decimal_macros::dec;
    use stakebridge_sdk::{DecodedOutput, DecodedTransaction, OpenTransaction, PendingWithdrawal};

    const LIQ: &str = "dLiquidity";

    fn signed(id: i64, customer: &str, amount: Decimal, txid: &str) -> SignedWithdrawal {
        let withdrawal = PendingWithdrawal {
            id,
            customer_address: customer.to_string(),
            token: "DFI".to_string(),
            amount,
            open_transaction_id: id * 10,
        };
        let transaction = OpenTransaction {
            id: id * 10,
            raw_tx: format!("04000000{:02x}", id),
            issuer_signature: format!("sig-{}", id),
        };
        let decoded = DecodedTransaction {
            txid: txid.to_string(),
            outputs: vec![DecodedOutput {
                address: Some(customer.to_string()),
                amount,
            }],
        };
        SignedWithdrawal {
            withdrawal,
            transaction,
            decoded,
        }
    }

    async fn checker() -> (Store, BalanceChecker) {
        let store = memory_store().await;
        let checker = BalanceChecker::new(store.clone(), "DFI", LIQ);
        (store, checker)
    }

    fn approved_ids(decisions: &[BalanceDecision]) -> Vec<i64> {
        decisions
            .iter()
            .filter_map(|d| match d {
                BalanceDecision::Approved(a) => Some(a.withdrawal.id),
                BalanceDecision::Rejected(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn available_balance_nets_vin_against_vout() {
        let (store, checker) = checker().await;
        seed_staking(&store, LIQ, "dDep", "dCust", "175.00000000", "25.00000000").await;

        assert_eq!(checker.available_balance("dCust").await.unwrap(), dec!(150));
        assert_eq!(
            checker.available_balance("dNobody").await.unwrap(),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn approves_request_covered_by_balance() {
        let (store, checker) = checker().await;
        seed_staking(&store, LIQ, "dDep", "dCust", "175.00000000", "25.00000000").await;

        let decisions = checker
            .check_balances(vec![signed(1, "dCust", dec!(150), "tx-1")])
            .await
            .unwrap();

        assert_eq!(approved_ids(&decisions), vec![1]);
        let reservations = store.reservations_for_token("DFI").await.unwrap();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].amount, "150.00000000");
        assert_eq!(reservations[0].transaction_id, "tx-1");
        assert_eq!(reservations[0].withdrawal_id, 1);
    }

    #[tokio::test]
    async fn duplicate_in_one_batch_reserves_once_but_approves_both() {
        let (store, checker) = checker().await;
        seed_staking(&store, LIQ, "dDep", "dCust", "175.00000000", "25.00000000").await;

        let decisions = checker
            .check_balances(vec![
                signed(1, "dCust", dec!(150), "tx-1"),
                signed(1, "dCust", dec!(150), "tx-1"),
            ])
            .await
            .unwrap();

        assert_eq!(approved_ids(&decisions), vec![1, 1]);
        assert_eq!(reservation_count(&store).await, 1);
        match &decisions[1] {
            BalanceDecision::Approved(second) => assert!(!second.freshly_reserved),
            BalanceDecision::Rejected(r) => panic!("duplicate rejected: {}", r.reason),
        }
    }

    #[tokio::test]
    async fn resubmission_across_cycles_is_absorbed() {
        let (store, checker) = checker().await;
        seed_staking(&store, LIQ, "dDep", "dCust", "175.00000000", "25.00000000").await;

        let first = checker
            .check_balances(vec![signed(1, "dCust", dec!(150), "tx-1")])
            .await
            .unwrap();
        assert_eq!(approved_ids(&first), vec![1]);

        // Same pair again next cycle: balance is fully reserved, yet the item
        // must come back approved without a second reservation.
        let second = checker
            .check_balances(vec![signed(1, "dCust", dec!(150), "tx-1")])
            .await
            .unwrap();
        assert_eq!(approved_ids(&second), vec![1]);
        assert_eq!(reservation_count(&store).await, 1);
    }

    #[tokio::test]
    async fn batch_consumes_balance_in_input_order() {
        let (store, checker) = checker().await;
        seed_staking(&store, LIQ, "dDep", "dCust", "150.00000000", "0.00000000").await;

        let decisions = checker
            .check_balances(vec![
                signed(1, "dCust", dec!(100), "tx-1"),
                signed(2, "dCust", dec!(50), "tx-2"),
                signed(3, "dCust", dec!(0.00000001), "tx-3"),
            ])
            .await
            .unwrap();

        assert_eq!(approved_ids(&decisions), vec![1, 2]);
        match &decisions[2] {
            BalanceDecision::Rejected(r) => {
                assert_eq!(r.reason, "[Withdrawal] ID: 3 - invalid balance");
            }
            BalanceDecision::Approved(_) => panic!("over-allocation approved"),
        }
        assert_eq!(reservation_count(&store).await, 2);
    }

    #[tokio::test]
    async fn unknown_customer_has_zero_balance() {
        let (store, checker) = checker().await;

        let decisions = checker
            .check_balances(vec![signed(1, "dUnknown", dec!(0.00000001), "tx-1")])
            .await
            .unwrap();

        assert!(approved_ids(&decisions).is_empty());
        assert_eq!(reservation_count(&store).await, 0);
    }

    #[tokio::test]
    async fn rejects_one_satoshi_past_the_balance() {
        let (store, checker) = checker().await;
        seed_staking(&store, LIQ, "dDep", "dCust", "24.99999999", "0.00000000").await;

        let decisions = checker
            .check_balances(vec![signed(1, "dCust", dec!(25), "tx-1")])
            .await
            .unwrap();
        assert!(approved_ids(&decisions).is_empty());
        assert_eq!(reservation_count(&store).await, 0);

        // Equality is boundary-inclusive.
        let decisions = checker
            .check_balances(vec![signed(2, "dCust", dec!(24.99999999), "tx-2")])
            .await
            .unwrap();
        assert_eq!(approved_ids(&decisions), vec![2]);
    }

    #[tokio::test]
    async fn prior_reservations_reduce_spendable_balance() {
        let (store, checker) = checker().await;
        seed_staking(&store, LIQ, "dDep", "dCust", "150.00000000", "0.00000000").await;

        let first = checker
            .check_balances(vec![signed(1, "dCust", dec!(100), "tx-1")])
            .await
            .unwrap();
        assert_eq!(approved_ids(&first), vec![1]);

        let second = checker
            .check_balances(vec![
                signed(2, "dCust", dec!(60), "tx-2"),
                signed(3, "dCust", dec!(50), "tx-3"),
            ])
            .await
            .unwrap();
        assert_eq!(approved_ids(&second), vec![3]);
    }
}
