use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// A customer's request to withdraw staked funds, as served by the business
/// API. Read-only to the bridge; immutable for the duration of one
/// authorization attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub id: i64,
    pub customer_address: String,
    pub token: String,
    /// Requested amount, 8 fractional digits.
    pub amount: Decimal,
    /// The not-yet-broadcast transaction that will pay the customer.
    pub open_transaction_id: i64,
}

impl PendingWithdrawal {
    pub fn validate(&self) -> Result<()> {
        if self.customer_address.is_empty() {
            return Err(SdkError::InvalidInput(format!(
                "withdrawal {} has no customer address",
                self.id
            )));
        }
        if self.amount <= Decimal::ZERO {
            return Err(SdkError::InvalidInput(format!(
                "withdrawal {} has non-positive amount {}",
                self.id, self.amount
            )));
        }
        Ok(())
    }
}
