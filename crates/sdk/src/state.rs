//! Workflow states for one withdrawal's pass through the authorization
//! pipeline. Each validation stage consumes the previous stage's typed result
//! and produces a new one; nothing is mutated in place.

use std::fmt;

use crate::transaction::{DecodedTransaction, OpenTransaction};
use crate::withdrawal::PendingWithdrawal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawalState {
    Open,
    SignatureChecked,
    BalanceChecked,
    Work,
    Invalid,
}

impl fmt::Display for WithdrawalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WithdrawalState::Open => "OPEN",
            WithdrawalState::SignatureChecked => "SIGNATURE_CHECKED",
            WithdrawalState::BalanceChecked => "BALANCE_CHECKED",
            WithdrawalState::Work => "WORK",
            WithdrawalState::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// A pending withdrawal joined with its open transaction — the OPEN state.
#[derive(Clone, Debug)]
pub struct TransactionWithdrawal {
    pub withdrawal: PendingWithdrawal,
    pub transaction: OpenTransaction,
}

impl TransactionWithdrawal {
    pub fn new(withdrawal: PendingWithdrawal, transaction: OpenTransaction) -> Self {
        Self {
            withdrawal,
            transaction,
        }
    }

    /// OPEN → SIGNATURE_CHECKED.
    pub fn signature_checked(self, decoded: DecodedTransaction) -> SignedWithdrawal {
        SignedWithdrawal {
            withdrawal: self.withdrawal,
            transaction: self.transaction,
            decoded,
        }
    }

    /// OPEN → INVALID.
    pub fn reject(self, reason: impl Into<String>) -> Rejection {
        Rejection {
            withdrawal_id: self.withdrawal.id,
            open_transaction_id: self.transaction.id,
            reason: reason.into(),
        }
    }
}

/// A withdrawal whose transaction decoded and whose issuer signature and
/// payout structure checked out — the SIGNATURE_CHECKED state.
#[derive(Clone, Debug)]
pub struct SignedWithdrawal {
    pub withdrawal: PendingWithdrawal,
    pub transaction: OpenTransaction,
    pub decoded: DecodedTransaction,
}

impl SignedWithdrawal {
    /// Chain txid the raw transaction will have once broadcast.
    pub fn txid(&self) -> &str {
        &self.decoded.txid
    }

    /// SIGNATURE_CHECKED → BALANCE_CHECKED.
    pub fn balance_checked(self, freshly_reserved: bool) -> ApprovedWithdrawal {
        ApprovedWithdrawal {
            withdrawal: self.withdrawal,
            transaction: self.transaction,
            decoded: self.decoded,
            freshly_reserved,
        }
    }

    /// SIGNATURE_CHECKED → INVALID with the canonical balance reason.
    pub fn reject_balance(self) -> Rejection {
        let reason = format!("[Withdrawal] ID: {} - invalid balance", self.withdrawal.id);
        Rejection {
            withdrawal_id: self.withdrawal.id,
            open_transaction_id: self.transaction.id,
            reason,
        }
    }
}

/// A withdrawal covered by balance, with its amount reserved — the
/// BALANCE_CHECKED state. Handed off to signing/broadcast after reporting.
#[derive(Clone, Debug)]
pub struct ApprovedWithdrawal {
    pub withdrawal: PendingWithdrawal,
    pub transaction: OpenTransaction,
    pub decoded: DecodedTransaction,
    /// False when an identical reservation already existed (re-submission).
    pub freshly_reserved: bool,
}

impl ApprovedWithdrawal {
    pub fn txid(&self) -> &str {
        &self.decoded.txid
    }

    /// Evidence reported back to the business API with the verified verdict.
    pub fn proof(&self) -> &str {
        &self.transaction.issuer_signature
    }
}

/// Terminal INVALID result; always carries a human-readable reason.
#[derive(Clone, Debug)]
pub struct Rejection {
    pub withdrawal_id: i64,
    pub open_transaction_id: i64,
    pub reason: String,
}

/// Outcome of the balance check for one withdrawal.
#[derive(Clone, Debug)]
pub enum BalanceDecision {
    Approved(ApprovedWithdrawal),
    Rejected(Rejection),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::DecodedOutput;
    use rust_decimal_macros::dec;

    fn open_item() -> TransactionWithdrawal {
        TransactionWithdrawal::new(
            PendingWithdrawal {
                id: 42,
                customer_address: "dCustomer1".into(),
                token: "DFI".into(),
                amount: dec!(150),
                open_transaction_id: 420,
            },
            OpenTransaction {
                id: 420,
                raw_tx: "0400000001".into(),
                issuer_signature: "sig".into(),
            },
        )
    }

    fn decoded() -> DecodedTransaction {
        DecodedTransaction {
            txid: "feed".repeat(16),
            outputs: vec![DecodedOutput {
                address: Some("dCustomer1".into()),
                amount: dec!(150),
            }],
        }
    }

    #[test]
    fn state_names_match_external_wire_names() {
        assert_eq!(WithdrawalState::SignatureChecked.to_string(), "SIGNATURE_CHECKED");
        assert_eq!(WithdrawalState::Invalid.to_string(), "INVALID");
    }

    #[test]
    fn stages_carry_the_original_request_through() {
        let signed = open_item().signature_checked(decoded());
        assert_eq!(signed.txid(), "feed".repeat(16));
        let approved = signed.balance_checked(true);
        assert_eq!(approved.withdrawal.id, 42);
        assert_eq!(approved.transaction.id, 420);
        assert!(approved.freshly_reserved);
    }

    #[test]
    fn balance_rejection_uses_canonical_reason() {
        let rejection = open_item().signature_checked(decoded()).reject_balance();
        assert_eq!(rejection.reason, "[Withdrawal] ID: 42 - invalid balance");
        assert_eq!(rejection.open_transaction_id, 420);
    }
}
