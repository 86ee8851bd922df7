use async_trait::async_trait;
use serde_json::json;
use stakebridge_http::HttpClient;
use tracing::debug;

use crate::error::Result;
use crate::transaction::OpenTransaction;
use crate::withdrawal::PendingWithdrawal;

/// The business API as consumed by the bridge. Each verification or
/// invalidation result is reported exactly once per processing cycle per
/// open-transaction id.
#[async_trait]
pub trait BusinessApi: Send + Sync {
    async fn fetch_open_transactions(&self) -> Result<Vec<OpenTransaction>>;
    async fn fetch_pending_withdrawals(&self) -> Result<Vec<PendingWithdrawal>>;
    async fn report_verified(&self, transaction_id: i64, proof: &str) -> Result<()>;
    async fn report_invalidated(&self, transaction_id: i64, reason: &str) -> Result<()>;
}

/// HTTP implementation against the business API.
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
}

impl ApiClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl BusinessApi for ApiClient {
    async fn fetch_open_transactions(&self) -> Result<Vec<OpenTransaction>> {
        let transactions: Vec<OpenTransaction> =
            self.http.get_json(&self.url("/transaction/open")).await?;
        debug!("Fetched {} open transactions", transactions.len());
        Ok(transactions)
    }

    async fn fetch_pending_withdrawals(&self) -> Result<Vec<PendingWithdrawal>> {
        let withdrawals: Vec<PendingWithdrawal> =
            self.http.get_json(&self.url("/withdrawal/pending")).await?;
        debug!("Fetched {} pending withdrawals", withdrawals.len());
        Ok(withdrawals)
    }

    async fn report_verified(&self, transaction_id: i64, proof: &str) -> Result<()> {
        let url = self.url(&format!("/transaction/{}/verified", transaction_id));
        self.http.post_ok(&url, &json!({ "signature": proof })).await?;
        Ok(())
    }

    async fn report_invalidated(&self, transaction_id: i64, reason: &str) -> Result<()> {
        let url = self.url(&format!("/transaction/{}/invalidated", transaction_id));
        self.http.post_ok(&url, &json!({ "reason": reason })).await?;
        Ok(())
    }
}
