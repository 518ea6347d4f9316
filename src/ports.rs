//! Ports the ledger core depends on.
//! Adapters live in `crate::adapters`; the services only see these traits.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{OrderPaymentStatus, Transaction, TransactionStatus, Wallet};
use crate::error::LedgerResult;

/// Mutable fields of a persisted transaction.
#[derive(Debug, Clone)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub balance_after: Option<BigDecimal>,
    pub order_id: Option<Uuid>,
}

/// Transactional relational store holding wallets and ledger rows.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a store-level transaction.
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerSession>>;

    async fn create_wallet(&self, wallet: &Wallet) -> LedgerResult<Wallet>;

    async fn find_wallet(&self, wallet_id: Uuid) -> LedgerResult<Option<Wallet>>;

    async fn find_wallet_by_user(&self, user_id: Uuid) -> LedgerResult<Option<Wallet>>;

    async fn find_transaction(&self, id: Uuid) -> LedgerResult<Option<Transaction>>;
}

/// One open store transaction. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait LedgerSession: Send {
    async fn find_wallet(&mut self, wallet_id: Uuid) -> LedgerResult<Option<Wallet>>;

    async fn find_wallet_by_user(&mut self, user_id: Uuid) -> LedgerResult<Option<Wallet>>;

    /// Conditional update: applies `delta` only if the row is still at
    /// `expected_version` and the result stays non-negative. Returns the
    /// updated row with `version = expected_version + 1`.
    ///
    /// Errors: `WalletNotFound`, `InsufficientBalance`, `VersionConflict`.
    async fn apply_wallet_delta(
        &mut self,
        wallet_id: Uuid,
        expected_version: i64,
        delta: &BigDecimal,
    ) -> LedgerResult<Wallet>;

    async fn insert_transaction(&mut self, tx: &Transaction) -> LedgerResult<Transaction>;

    /// Reads the row and holds it against other sessions' status writers
    /// until this session commits or rolls back.
    async fn lock_transaction(&mut self, id: Uuid) -> LedgerResult<Option<Transaction>>;

    async fn update_transaction(
        &mut self,
        id: Uuid,
        update: &TransactionUpdate,
    ) -> LedgerResult<Transaction>;

    async fn savepoint(&mut self) -> LedgerResult<()>;

    async fn rollback_to_savepoint(&mut self) -> LedgerResult<()>;

    async fn release_savepoint(&mut self) -> LedgerResult<()>;

    async fn commit(self: Box<Self>) -> LedgerResult<()>;

    async fn rollback(self: Box<Self>) -> LedgerResult<()>;
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Advisory key/value cache for wallet snapshots.
#[async_trait]
pub trait WalletCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Error, Debug)]
pub enum OrderGatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Unexpected response from order service: {0}")]
    UnexpectedStatus(u16),

    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Narrow callback into the order aggregate.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn set_order_payment_status(
        &self,
        order_id: Uuid,
        status: OrderPaymentStatus,
    ) -> Result<(), OrderGatewayError>;
}
