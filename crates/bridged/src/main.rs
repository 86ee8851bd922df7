use std::sync::Arc;
use std::time::Duration;

use stakebridge_http::HttpClient;
use stakebridge_sdk::{ApiClient, RpcClient};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod alert;
mod balance;
mod config;
mod error;
mod pipeline;
mod reconcile;
mod scheduler;
mod store;

use alert::{AlertSink, NullSink, WebhookSink};
use balance::BalanceChecker;
use config::BridgeConfig;
use pipeline::WithdrawalPipeline;
use reconcile::Reconciler;
use scheduler::Scheduler;
use store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bridged=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting stakebridge withdrawal authorizer");

    dotenvy::dotenv().ok();
    let config = BridgeConfig::from_env()?;

    info!("Business API: {}", config.api_base_url);
    info!("Node RPC: {}", config.rpc_url);
    info!(
        "Token {} backed by liquidity address {}",
        config.token, config.liquidity_address
    );

    let store = Store::connect(&config.database_url).await?;
    store.ensure_schema().await?;

    let mut api_http = stakebridge_http::Config::default().with_timeout(config.http_timeout_secs);
    if let Some(token) = &config.api_token {
        api_http = api_http.with_bearer_token(token);
    }
    let api = Arc::new(ApiClient::new(
        HttpClient::new(api_http)?,
        &config.api_base_url,
    ));

    let mut rpc_http = stakebridge_http::Config::default().with_timeout(config.http_timeout_secs);
    if let (Some(user), Some(password)) = (&config.rpc_user, &config.rpc_password) {
        rpc_http = rpc_http.with_basic_auth(user, password);
    }
    let rpc = Arc::new(RpcClient::new(HttpClient::new(rpc_http)?, &config.rpc_url));

    let alerts: Arc<dyn AlertSink> = match &config.alert_webhook_url {
        Some(url) => {
            let http = HttpClient::new(
                stakebridge_http::Config::default().with_timeout(config.http_timeout_secs),
            )?;
            Arc::new(WebhookSink::new(http, url))
        }
        None => Arc::new(NullSink),
    };

    let checker = BalanceChecker::new(store.clone(), &config.token, &config.liquidity_address);
    let pipeline = Arc::new(WithdrawalPipeline::new(
        api,
        rpc,
        checker,
        &config.token,
        &config.issuer_address,
    ));
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        alerts,
        config.stale_after_hours,
    ));

    let mut scheduler = Scheduler::new(Duration::from_secs(config.shutdown_grace_secs));

    {
        let pipeline = pipeline.clone();
        scheduler.spawn_periodic(
            "withdrawal-pipeline",
            Duration::from_secs(config.check_interval_secs),
            move || {
                let pipeline = pipeline.clone();
                async move {
                    let summary = pipeline.run_cycle().await?;
                    info!(
                        "Cycle complete: {} fetched, {} skipped, {} verified, {} invalidated, {} report failures",
                        summary.fetched,
                        summary.skipped,
                        summary.verified,
                        summary.invalidated,
                        summary.report_failures
                    );
                    Ok(())
                }
            },
        );
    }

    {
        let reconciler = reconciler.clone();
        let token = config.token.clone();
        scheduler.spawn_periodic(
            "reservation-reconciler",
            Duration::from_secs(config.reconcile_interval_secs),
            move || {
                let reconciler = reconciler.clone();
                let token = token.clone();
                async move {
                    let summary = reconciler.reconcile(&token).await?;
                    info!(
                        "Reconcile pass: {} freed, {} stale, {} within window",
                        summary.freed, summary.stale, summary.kept
                    );
                    Ok(())
                }
            },
        );
    }

    wait_for_signal().await;
    info!("Shutting down");
    scheduler.shutdown().await;
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
