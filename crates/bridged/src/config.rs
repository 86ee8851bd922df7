use anyhow::anyhow;

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub database_url: String,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    /// Token this instance authorizes withdrawals for.
    pub token: String,
    /// Liquidity address whose staking rows back the token's balances.
    pub liquidity_address: String,
    /// Address whose signature every open transaction must carry.
    pub issuer_address: String,
    pub check_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub stale_after_hours: i64,
    pub alert_webhook_url: Option<String>,
    pub http_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl BridgeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://stakebridge.db?mode=rwc".to_string());

        let api_base_url = std::env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8081/v1".to_string());
        let api_token = std::env::var("API_TOKEN").ok();

        let rpc_url =
            std::env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8554".to_string());
        let rpc_user = std::env::var("RPC_USER").ok();
        let rpc_password = std::env::var("RPC_PASSWORD").ok();

        let token = std::env::var("STAKING_TOKEN").unwrap_or_else(|_| "DFI".to_string());
        let liquidity_address = std::env::var("LIQUIDITY_ADDRESS")
            .map_err(|_| anyhow!("LIQUIDITY_ADDRESS must be set"))?;
        let issuer_address =
            std::env::var("ISSUER_ADDRESS").map_err(|_| anyhow!("ISSUER_ADDRESS must be set"))?;

        Ok(Self {
            database_url,
            api_base_url,
            api_token,
            rpc_url,
            rpc_user,
            rpc_password,
            token,
            liquidity_address,
            issuer_address,
            check_interval_secs: env_u64("CHECK_INTERVAL_SECS", 60),
            reconcile_interval_secs: env_u64("RECONCILE_INTERVAL_SECS", 300),
            stale_after_hours: env_u64("STALE_AFTER_HOURS", 24) as i64,
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").ok(),
            http_timeout_secs: env_u64("HTTP_TIMEOUT_SECS", 30),
            shutdown_grace_secs: env_u64("SHUTDOWN_GRACE_SECS", 30),
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
