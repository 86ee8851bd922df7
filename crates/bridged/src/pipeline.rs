//! Orchestrates one authorization cycle: fetch pending withdrawals and their
//! open transactions, run them through signature/structure checking and the
//! batch balance check, and report each verdict back to the business API.

use std::collections::HashMap;
use std::sync::Arc;

use stakebridge_sdk::amount::format_amount;
use stakebridge_sdk::{
    BalanceDecision, BusinessApi, ChainRpc, Rejection, SdkError, SignedWithdrawal,
    TransactionWithdrawal, WithdrawalState,
};
use tracing::{debug, info, warn};

use crate::balance::BalanceChecker;
use crate::error::Result;

pub struct WithdrawalPipeline {
    api: Arc<dyn BusinessApi>,
    rpc: Arc<dyn ChainRpc>,
    checker: BalanceChecker,
    token: String,
    issuer_address: String,
}

#[derive(Debug, Default)]
pub struct CycleSummary {
    pub fetched: usize,
    /// Withdrawals not processed this cycle: wrong token, or no matching
    /// open transaction yet.
    pub skipped: usize,
    pub verified: usize,
    pub invalidated: usize,
    /// Verdicts reached but not delivered; the next cycle re-derives them.
    pub report_failures: usize,
}

impl WithdrawalPipeline {
    pub fn new(
        api: Arc<dyn BusinessApi>,
        rpc: Arc<dyn ChainRpc>,
        checker: BalanceChecker,
        token: &str,
        issuer_address: &str,
    ) -> Self {
        Self {
            api,
            rpc,
            checker,
            token: token.to_string(),
            issuer_address: issuer_address.to_string(),
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let withdrawals = self.api.fetch_pending_withdrawals().await?;
        let transactions = self.api.fetch_open_transactions().await?;
        let mut transactions_by_id: HashMap<i64, _> =
            transactions.into_iter().map(|t| (t.id, t)).collect();

        let mut summary = CycleSummary {
            fetched: withdrawals.len(),
            ..Default::default()
        };

        let mut open_items = Vec::new();
        for withdrawal in withdrawals {
            if withdrawal.token != self.token {
                debug!(
                    "Skipping withdrawal {}: token {} is not handled here",
                    withdrawal.id, withdrawal.token
                );
                summary.skipped += 1;
                continue;
            }
            match transactions_by_id.remove(&withdrawal.open_transaction_id) {
                Some(transaction) => {
                    open_items.push(TransactionWithdrawal::new(withdrawal, transaction))
                }
                None => {
                    warn!(
                        "Withdrawal {} has no open transaction {} this cycle",
                        withdrawal.id, withdrawal.open_transaction_id
                    );
                    summary.skipped += 1;
                }
            }
        }

        let mut signed = Vec::new();
        for item in open_items {
            match self.check_signature(item).await? {
                Ok(checked) => signed.push(checked),
                Err(rejection) => self.report_rejection(&rejection, &mut summary).await,
            }
        }

        for decision in self.checker.check_balances(signed).await? {
            match decision {
                BalanceDecision::Approved(approved) => {
                    match self
                        .api
                        .report_verified(approved.transaction.id, approved.proof())
                        .await
                    {
                        Ok(()) => {
                            info!(
                                "Withdrawal {} -> {} (txid {}), reported verified",
                                approved.withdrawal.id,
                                WithdrawalState::BalanceChecked,
                                approved.txid()
                            );
                            summary.verified += 1;
                        }
                        Err(e) => {
                            warn!(
                                "Failed to report verified transaction {}: {}",
                                approved.transaction.id, e
                            );
                            summary.report_failures += 1;
                        }
                    }
                }
                BalanceDecision::Rejected(rejection) => {
                    self.report_rejection(&rejection, &mut summary).await
                }
            }
        }

        Ok(summary)
    }

    /// OPEN → SIGNATURE_CHECKED, or a terminal rejection. A node-side refusal
    /// (malformed data) rejects the item; a transport failure aborts the run
    /// so the scheduler can retry the whole cycle.
    async fn check_signature(
        &self,
        item: TransactionWithdrawal,
    ) -> Result<std::result::Result<SignedWithdrawal, Rejection>> {
        if let Err(e) = item.withdrawal.validate() {
            return Ok(Err(item.reject(format!("invalid withdrawal request: {}", e))));
        }
        if item.transaction.raw_tx.trim().is_empty() {
            return Ok(Err(item.reject("empty raw transaction")));
        }

        let signature_verdict = self
            .rpc
            .verify_message(
                &self.issuer_address,
                &item.transaction.issuer_signature,
                &item.transaction.raw_tx,
            )
            .await;
        match signature_verdict {
            Ok(true) => {}
            Ok(false) => return Ok(Err(item.reject("issuer signature does not verify"))),
            Err(SdkError::Rpc(e)) => {
                return Ok(Err(
                    item.reject(format!("issuer signature rejected by node: {}", e))
                ))
            }
            Err(e) => return Err(e.into()),
        }

        let decode_result = self.rpc.decode_raw_transaction(&item.transaction.raw_tx).await;
        let decoded = match decode_result {
            Ok(decoded) => decoded,
            Err(SdkError::Rpc(e)) => {
                return Ok(Err(item.reject(format!("transaction decode failed: {}", e))))
            }
            Err(e) => return Err(e.into()),
        };

        if !decoded.pays(&item.withdrawal.customer_address, item.withdrawal.amount) {
            let reason = format!(
                "decoded transaction {} does not pay {} {} to {}",
                decoded.txid,
                format_amount(item.withdrawal.amount),
                item.withdrawal.token,
                item.withdrawal.customer_address
            );
            return Ok(Err(item.reject(reason)));
        }

        Ok(Ok(item.signature_checked(decoded)))
    }

    async fn report_rejection(&self, rejection: &Rejection, summary: &mut CycleSummary) {
        warn!(
            "Withdrawal {} -> {}: {}",
            rejection.withdrawal_id,
            WithdrawalState::Invalid,
            rejection.reason
        );
        match self
            .api
            .report_invalidated(rejection.open_transaction_id, &rejection.reason)
            .await
        {
            Ok(()) => summary.invalidated += 1,
            Err(e) => {
                warn!(
                    "Failed to report invalidated transaction {}: {}",
                    rejection.open_transaction_id, e
                );
                summary.report_failures += 1;
            }
        }
    }
}
