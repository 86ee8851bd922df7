pub mod amount;
pub mod api;
pub mod error;
pub mod rpc;
pub mod state;
pub mod transaction;
pub mod withdrawal;

pub use api::{ApiClient, BusinessApi};
pub use error::{Result, SdkError};
pub use rpc::{ChainRpc, RpcClient};
pub use state::{
    ApprovedWithdrawal, BalanceDecision, Rejection, SignedWithdrawal, TransactionWithdrawal,
    WithdrawalState,
};
pub use transaction::{DecodedOutput, DecodedTransaction, OpenTransaction};
pub use withdrawal::PendingWithdrawal;
