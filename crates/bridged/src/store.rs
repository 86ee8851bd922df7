//! Persistence layer: the reservation table this service owns, plus read
//! access to the ledger mirror's `staking` and `transactions` tables.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use stakebridge_sdk::amount;
use tracing::info;

use crate::error::Result;

/// An outstanding withdrawal reservation. Amounts are stored as 8-decimal
/// strings and summed in `Decimal`, never in SQL.
#[derive(Clone, Debug, FromRow)]
pub struct Reservation {
    pub id: i64,
    pub token: String,
    pub withdrawal_id: i64,
    pub transaction_id: String,
    pub customer_address: String,
    pub amount: String,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    #[allow(dead_code)]
    pub fn amount_decimal(&self) -> Result<Decimal> {
        Ok(amount::parse_amount(&self.amount)?)
    }
}

/// A reservation about to be written.
pub struct NewReservation<'a> {
    pub token: &'a str,
    pub withdrawal_id: i64,
    pub transaction_id: &'a str,
    pub customer_address: &'a str,
    pub amount: Decimal,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        info!("Connected to database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the owned reservation schema. The mirror tables (`staking`,
    /// `transactions`) belong to the ingestion path and are not created here.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS reservations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT NOT NULL,
                withdrawal_id INTEGER NOT NULL,
                transaction_id TEXT NOT NULL,
                customer_address TEXT NOT NULL,
                amount TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_reservations_key
             ON reservations (token, withdrawal_id, transaction_id, customer_address)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn staking_balance(
        &self,
        liquidity_address: &str,
        customer_address: &str,
    ) -> Result<Decimal> {
        let mut conn = self.pool.acquire().await?;
        staking_balance(&mut conn, liquidity_address, customer_address).await
    }

    /// Whether the mirror has seen this transaction confirmed on-chain.
    pub async fn transaction_confirmed(&self, txid: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM transactions WHERE txid = ?")
            .bind(txid)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn reservations_for_token(&self, token: &str) -> Result<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT id, token, withdrawal_id, transaction_id, customer_address, amount, created_at
             FROM reservations WHERE token = ? ORDER BY created_at",
        )
        .bind(token)
        .fetch_all(&self.pool)
        .await?;
        Ok(reservations)
    }

    pub async fn delete_reservation(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM reservations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// `sum(vin) - sum(vout)` over the staking rows for one customer under one
/// liquidity address; zero when no row matches.
pub async fn staking_balance(
    conn: &mut SqliteConnection,
    liquidity_address: &str,
    customer_address: &str,
) -> Result<Decimal> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT vin, vout FROM staking WHERE liquidity_address = ? AND customer_address = ?",
    )
    .bind(liquidity_address)
    .bind(customer_address)
    .fetch_all(&mut *conn)
    .await?;

    let mut balance = Decimal::ZERO;
    for (vin, vout) in rows {
        balance += amount::parse_amount(&vin)?;
        balance -= amount::parse_amount(&vout)?;
    }
    Ok(balance)
}

/// Sum of outstanding reservation amounts for one customer and token.
pub async fn reserved_total(
    conn: &mut SqliteConnection,
    token: &str,
    customer_address: &str,
) -> Result<Decimal> {
    let amounts: Vec<String> = sqlx::query_scalar(
        "SELECT amount FROM reservations WHERE token = ? AND customer_address = ?",
    )
    .bind(token)
    .bind(customer_address)
    .fetch_all(&mut *conn)
    .await?;

    let mut total = Decimal::ZERO;
    for value in amounts {
        total += amount::parse_amount(&value)?;
    }
    Ok(total)
}

pub async fn reservation_exists(
    conn: &mut SqliteConnection,
    reservation: &NewReservation<'_>,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM reservations
         WHERE token = ? AND withdrawal_id = ? AND transaction_id = ? AND customer_address = ?",
    )
    .bind(reservation.token)
    .bind(reservation.withdrawal_id)
    .bind(reservation.transaction_id)
    .bind(reservation.customer_address)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

/// Insert-or-no-op on the natural unique key. Returns whether a new row was
/// created, so callers can tell "freshly reserved" from "already reserved".
pub async fn insert_reservation(
    conn: &mut SqliteConnection,
    reservation: &NewReservation<'_>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO reservations
            (token, withdrawal_id, transaction_id, customer_address, amount, created_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (token, withdrawal_id, transaction_id, customer_address) DO NOTHING",
    )
    .bind(reservation.token)
    .bind(reservation.withdrawal_id)
    .bind(reservation.transaction_id)
    .bind(reservation.customer_address)
    .bind(amount::format_amount(reservation.amount))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
