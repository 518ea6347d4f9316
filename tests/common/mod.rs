#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;
use uuid::Uuid;

use wallet_ledger::adapters::InMemoryLedgerStore;
use wallet_ledger::domain::{OrderPaymentStatus, Transaction, Wallet};
use wallet_ledger::error::LedgerResult;
use wallet_ledger::ports::{LedgerSession, LedgerStore, OrderGateway, OrderGatewayError};

pub fn amount(s: &str) -> BigDecimal {
    s.parse().unwrap()
}

/// Order gateway that records every push and can be switched to fail.
#[derive(Default)]
pub struct RecordingOrderGateway {
    calls: Mutex<Vec<(Uuid, OrderPaymentStatus)>>,
    failing: AtomicBool,
}

impl RecordingOrderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(Uuid, OrderPaymentStatus)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderGateway for RecordingOrderGateway {
    async fn set_order_payment_status(
        &self,
        order_id: Uuid,
        status: OrderPaymentStatus,
    ) -> Result<(), OrderGatewayError> {
        self.calls.lock().unwrap().push((order_id, status));
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrderGatewayError::UnexpectedStatus(503));
        }
        Ok(())
    }
}

/// Holds the first `gated` calls to `begin` until all of them have arrived,
/// so that concurrent transfers open their sessions on the same snapshot.
pub struct GatedStore {
    inner: InMemoryLedgerStore,
    barrier: Barrier,
    remaining: AtomicUsize,
}

impl GatedStore {
    pub fn new(inner: InMemoryLedgerStore, gated: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(gated),
            remaining: AtomicUsize::new(gated),
        }
    }
}

#[async_trait]
impl LedgerStore for GatedStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerSession>> {
        let gated = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.barrier.wait().await;
        }
        self.inner.begin().await
    }

    async fn create_wallet(&self, wallet: &Wallet) -> LedgerResult<Wallet> {
        self.inner.create_wallet(wallet).await
    }

    async fn find_wallet(&self, wallet_id: Uuid) -> LedgerResult<Option<Wallet>> {
        self.inner.find_wallet(wallet_id).await
    }

    async fn find_wallet_by_user(&self, user_id: Uuid) -> LedgerResult<Option<Wallet>> {
        self.inner.find_wallet_by_user(user_id).await
    }

    async fn find_transaction(&self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        self.inner.find_transaction(id).await
    }
}

pub fn shared(store: &InMemoryLedgerStore) -> Arc<dyn LedgerStore> {
    Arc::new(store.clone())
}
