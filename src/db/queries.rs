use sqlx::types::BigDecimal;
use sqlx::{PgConnection, Result};
use uuid::Uuid;

use crate::db::models::{TransactionRow, WalletRow};
use crate::domain::{Transaction, Wallet};
use crate::ports::TransactionUpdate;

const WALLET_COLUMNS: &str = "id, user_id, balance, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, wallet_id, transaction_type, amount, balance_after, \
     status, source, destination, destination_type, order_id, reference_order_id, \
     created_at, updated_at";

// --- Wallet Queries ---

pub async fn insert_wallet(conn: &mut PgConnection, wallet: &Wallet) -> Result<WalletRow> {
    sqlx::query_as::<_, WalletRow>(&format!(
        r#"
        INSERT INTO wallets (id, user_id, balance, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        WALLET_COLUMNS
    ))
    .bind(wallet.id)
    .bind(wallet.user_id)
    .bind(&wallet.balance)
    .bind(wallet.version)
    .bind(wallet.created_at)
    .bind(wallet.updated_at)
    .fetch_one(conn)
    .await
}

pub async fn get_wallet(conn: &mut PgConnection, id: Uuid) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>(&format!(
        "SELECT {} FROM wallets WHERE id = $1",
        WALLET_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn get_wallet_by_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>(&format!(
        "SELECT {} FROM wallets WHERE user_id = $1",
        WALLET_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

/// Version-guarded balance update. `None` means zero rows matched.
pub async fn apply_wallet_delta(
    conn: &mut PgConnection,
    id: Uuid,
    expected_version: i64,
    delta: &BigDecimal,
) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>(&format!(
        r#"
        UPDATE wallets
        SET balance = balance + $3, version = version + 1, updated_at = NOW()
        WHERE id = $1 AND version = $2 AND balance + $3 >= 0
        RETURNING {}
        "#,
        WALLET_COLUMNS
    ))
    .bind(id)
    .bind(expected_version)
    .bind(delta)
    .fetch_optional(conn)
    .await
}

// --- Transaction Queries ---

pub async fn insert_transaction(conn: &mut PgConnection, tx: &Transaction) -> Result<TransactionRow> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO transactions (
            id, user_id, wallet_id, transaction_type, amount, balance_after,
            status, source, destination, destination_type, order_id, reference_order_id,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(tx.wallet_id)
    .bind(tx.transaction_type.as_str())
    .bind(&tx.amount)
    .bind(&tx.balance_after)
    .bind(tx.status.as_str())
    .bind(tx.source.as_str())
    .bind(tx.destination.map(|d| d.id()))
    .bind(tx.destination_type().map(|d| d.as_str()))
    .bind(tx.order_id)
    .bind(tx.reference_order_id)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(conn)
    .await
}

pub async fn get_transaction(conn: &mut PgConnection, id: Uuid) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions WHERE id = $1",
        TRANSACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn lock_transaction(conn: &mut PgConnection, id: Uuid) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {} FROM transactions WHERE id = $1 FOR UPDATE",
        TRANSACTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Only status, balance_after and a missing order_id are ever written after insert.
pub async fn update_transaction(
    conn: &mut PgConnection,
    id: Uuid,
    update: &TransactionUpdate,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        UPDATE transactions
        SET status = $2,
            balance_after = COALESCE($3, balance_after),
            order_id = COALESCE(order_id, $4),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    ))
    .bind(id)
    .bind(update.status.as_str())
    .bind(&update.balance_after)
    .bind(update.order_id)
    .fetch_optional(conn)
    .await
}

// --- Savepoints ---

pub async fn savepoint(conn: &mut PgConnection, name: &str) -> Result<()> {
    sqlx::query(&format!("SAVEPOINT {}", name))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn rollback_to_savepoint(conn: &mut PgConnection, name: &str) -> Result<()> {
    sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", name))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn release_savepoint(conn: &mut PgConnection, name: &str) -> Result<()> {
    sqlx::query(&format!("RELEASE SAVEPOINT {}", name))
        .execute(conn)
        .await?;
    Ok(())
}
