//! Postgres implementation of the ledger store ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::classify_rejected_update;
use crate::db::queries;
use crate::domain::{Transaction, Wallet};
use crate::error::{LedgerError, LedgerResult};
use crate::ports::{LedgerSession, LedgerStore, TransactionUpdate};

const ATTEMPT_SAVEPOINT: &str = "ledger_attempt";

/// Postgres-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerSession>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresLedgerSession { tx }))
    }

    async fn create_wallet(&self, wallet: &Wallet) -> LedgerResult<Wallet> {
        let mut conn = self.pool.acquire().await?;
        let row = queries::insert_wallet(&mut conn, wallet).await?;
        Ok(row.into())
    }

    async fn find_wallet(&self, wallet_id: Uuid) -> LedgerResult<Option<Wallet>> {
        let mut conn = self.pool.acquire().await?;
        let row = queries::get_wallet(&mut conn, wallet_id).await?;
        Ok(row.map(Wallet::from))
    }

    async fn find_wallet_by_user(&self, user_id: Uuid) -> LedgerResult<Option<Wallet>> {
        let mut conn = self.pool.acquire().await?;
        let row = queries::get_wallet_by_user(&mut conn, user_id).await?;
        Ok(row.map(Wallet::from))
    }

    async fn find_transaction(&self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        queries::get_transaction(&mut conn, id)
            .await?
            .map(|r| r.into_domain())
            .transpose()
    }
}

/// A live `BEGIN ... COMMIT` block on one pooled connection.
pub struct PostgresLedgerSession {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerSession for PostgresLedgerSession {
    async fn find_wallet(&mut self, wallet_id: Uuid) -> LedgerResult<Option<Wallet>> {
        let row = queries::get_wallet(&mut self.tx, wallet_id).await?;
        Ok(row.map(Wallet::from))
    }

    async fn find_wallet_by_user(&mut self, user_id: Uuid) -> LedgerResult<Option<Wallet>> {
        let row = queries::get_wallet_by_user(&mut self.tx, user_id).await?;
        Ok(row.map(Wallet::from))
    }

    async fn apply_wallet_delta(
        &mut self,
        wallet_id: Uuid,
        expected_version: i64,
        delta: &BigDecimal,
    ) -> LedgerResult<Wallet> {
        if let Some(row) =
            queries::apply_wallet_delta(&mut self.tx, wallet_id, expected_version, delta).await?
        {
            return Ok(row.into());
        }

        // Zero rows: find out which guard rejected the update.
        let current = queries::get_wallet(&mut self.tx, wallet_id)
            .await?
            .map(Wallet::from);
        Err(classify_rejected_update(
            wallet_id,
            expected_version,
            delta,
            current.as_ref(),
        ))
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> LedgerResult<Transaction> {
        queries::insert_transaction(&mut self.tx, tx)
            .await?
            .into_domain()
    }

    async fn lock_transaction(&mut self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        queries::lock_transaction(&mut self.tx, id)
            .await?
            .map(|r| r.into_domain())
            .transpose()
    }

    async fn update_transaction(
        &mut self,
        id: Uuid,
        update: &TransactionUpdate,
    ) -> LedgerResult<Transaction> {
        queries::update_transaction(&mut self.tx, id, update)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))?
            .into_domain()
    }

    async fn savepoint(&mut self) -> LedgerResult<()> {
        queries::savepoint(&mut self.tx, ATTEMPT_SAVEPOINT).await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> LedgerResult<()> {
        queries::rollback_to_savepoint(&mut self.tx, ATTEMPT_SAVEPOINT).await?;
        Ok(())
    }

    async fn release_savepoint(&mut self) -> LedgerResult<()> {
        queries::release_savepoint(&mut self.tx, ATTEMPT_SAVEPOINT).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
