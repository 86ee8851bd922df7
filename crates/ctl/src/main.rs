use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};

#[derive(Parser)]
#[command(name = "bridgectl", about = "Inspect the staking bridge reservation store")]
struct Cli {
    /// Database the bridge service writes to
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://stakebridge.db")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List outstanding reservations, oldest first
    Reservations {
        /// Restrict to one token
        #[arg(long)]
        token: Option<String>,
    },
    /// Show a customer's ledger, reserved and spendable balances
    Balance {
        customer_address: String,
        #[arg(long, env = "LIQUIDITY_ADDRESS")]
        liquidity: String,
        #[arg(long, env = "STAKING_TOKEN", default_value = "DFI")]
        token: String,
    },
    /// Preview a reconcile pass: what would be freed, what is stale
    Stale {
        #[arg(long, env = "STAKING_TOKEN", default_value = "DFI")]
        token: String,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

#[derive(FromRow)]
struct ReservationRow {
    id: i64,
    token: String,
    withdrawal_id: i64,
    transaction_id: String,
    customer_address: String,
    amount: String,
    created_at: DateTime<Utc>,
}

impl ReservationRow {
    fn age_hours(&self) -> i64 {
        (Utc::now() - self.created_at).num_hours()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&cli.database_url)
        .await?;

    match cli.command {
        Command::Reservations { token } => list_reservations(&pool, token.as_deref()).await,
        Command::Balance {
            customer_address,
            liquidity,
            token,
        } => show_balance(&pool, &liquidity, &customer_address, &token).await,
        Command::Stale { token, hours } => preview_reconcile(&pool, &token, hours).await,
    }
}

async fn fetch_reservations(pool: &SqlitePool, token: Option<&str>) -> Result<Vec<ReservationRow>> {
    let rows = match token {
        Some(token) => {
            sqlx::query_as::<_, ReservationRow>(
                "SELECT id, token, withdrawal_id, transaction_id, customer_address, amount, created_at
                 FROM reservations WHERE token = ? ORDER BY created_at",
            )
            .bind(token)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, ReservationRow>(
                "SELECT id, token, withdrawal_id, transaction_id, customer_address, amount, created_at
                 FROM reservations ORDER BY created_at",
            )
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

async fn list_reservations(pool: &SqlitePool, token: Option<&str>) -> Result<()> {
    let rows = fetch_reservations(pool, token).await?;
    if rows.is_empty() {
        println!("No outstanding reservations");
        return Ok(());
    }

    println!(
        "{:<6} {:<6} {:<12} {:<18} {:>18} {:>6}  transaction",
        "id", "token", "withdrawal", "customer", "amount", "age(h)"
    );
    for row in &rows {
        println!(
            "{:<6} {:<6} {:<12} {:<18} {:>18} {:>6}  {}",
            row.id,
            row.token,
            row.withdrawal_id,
            row.customer_address,
            row.amount,
            row.age_hours(),
            row.transaction_id
        );
    }
    println!("{} reservation(s)", rows.len());
    Ok(())
}

async fn show_balance(
    pool: &SqlitePool,
    liquidity: &str,
    customer: &str,
    token: &str,
) -> Result<()> {
    let staking: Vec<(String, String)> = sqlx::query_as(
        "SELECT vin, vout FROM staking WHERE liquidity_address = ? AND customer_address = ?",
    )
    .bind(liquidity)
    .bind(customer)
    .fetch_all(pool)
    .await?;

    let mut ledger = Decimal::ZERO;
    for (vin, vout) in &staking {
        ledger += parse_amount(vin)?;
        ledger -= parse_amount(vout)?;
    }

    let reserved_amounts: Vec<String> = sqlx::query_scalar(
        "SELECT amount FROM reservations WHERE token = ? AND customer_address = ?",
    )
    .bind(token)
    .bind(customer)
    .fetch_all(pool)
    .await?;

    let mut reserved = Decimal::ZERO;
    for amount in &reserved_amounts {
        reserved += parse_amount(amount)?;
    }

    println!("Customer:  {}", customer);
    println!("Ledger:    {} ({} staking row(s))", ledger, staking.len());
    println!("Reserved:  {} ({} reservation(s))", reserved, reserved_amounts.len());
    println!("Spendable: {}", ledger - reserved);
    Ok(())
}

async fn preview_reconcile(pool: &SqlitePool, token: &str, hours: i64) -> Result<()> {
    let rows = fetch_reservations(pool, Some(token)).await?;
    let mut would_free = 0usize;
    let mut stale = 0usize;
    let mut fresh = 0usize;

    for row in &rows {
        let confirmed: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM transactions WHERE txid = ?")
            .bind(&row.transaction_id)
            .fetch_one(pool)
            .await?;
        if confirmed > 0 {
            would_free += 1;
            println!(
                "would free: withdrawal {} ({}) - transaction {} confirmed",
                row.withdrawal_id, row.amount, row.transaction_id
            );
        } else if row.age_hours() >= hours {
            stale += 1;
            println!(
                "STALE:      withdrawal {} ({}) - unconfirmed for {}h (customer {})",
                row.withdrawal_id,
                row.amount,
                row.age_hours(),
                row.customer_address
            );
        } else {
            fresh += 1;
        }
    }

    println!(
        "{} reservation(s): {} would free, {} stale, {} within window",
        rows.len(),
        would_free,
        stale,
        fresh
    );
    Ok(())
}

fn parse_amount(s: &str) -> Result<Decimal> {
    Decimal::from_str(s.trim()).map_err(|e| anyhow!("invalid amount '{}': {}", s, e))
}
