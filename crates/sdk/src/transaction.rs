use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A candidate blockchain transaction held by the business API, tied to one
/// pending withdrawal. Fetched each cycle, never persisted locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenTransaction {
    pub id: i64,
    /// Raw transaction hex, as it will eventually be broadcast.
    pub raw_tx: String,
    /// Issuer signature over the raw transaction hex.
    pub issuer_signature: String,
}

/// On-chain structure of a raw transaction, as decoded by the node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedTransaction {
    pub txid: String,
    pub outputs: Vec<DecodedOutput>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedOutput {
    /// Receiving address; absent for non-address outputs (e.g. OP_RETURN).
    pub address: Option<String>,
    pub amount: Decimal,
}

impl DecodedTransaction {
    /// Whether some output pays `address` exactly `amount`.
    pub fn pays(&self, address: &str, amount: Decimal) -> bool {
        self.outputs
            .iter()
            .any(|out| out.address.as_deref() == Some(address) && out.amount == amount)
    }
}
