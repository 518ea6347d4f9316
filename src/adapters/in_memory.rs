use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::classify_rejected_update;
use crate::domain::{DestinationType, Transaction, TransactionSource, TransactionType, Wallet};
use crate::error::{LedgerError, LedgerResult};
use crate::ports::{CacheError, LedgerSession, LedgerStore, TransactionUpdate, WalletCache};

type DedupKey = (Uuid, TransactionType, TransactionSource, Option<DestinationType>);

fn dedup_key(tx: &Transaction) -> Option<DedupKey> {
    tx.reference_order_id
        .map(|r| (r, tx.transaction_type, tx.source, tx.destination_type()))
}

#[derive(Default)]
struct LedgerState {
    wallets: HashMap<Uuid, Wallet>,
    transactions: HashMap<Uuid, Transaction>,
    injected_conflicts: HashMap<Uuid, u32>,
    failing_inserts: u32,
    row_locks: HashMap<Uuid, Arc<Mutex<()>>>,
}

impl LedgerState {
    fn wallet_by_user(&self, user_id: Uuid) -> Option<&Wallet> {
        self.wallets.values().find(|w| w.user_id == user_id)
    }

    fn duplicate_of(&self, tx: &Transaction) -> Option<Uuid> {
        let key = dedup_key(tx)?;
        self.transactions
            .values()
            .find(|t| t.id != tx.id && dedup_key(t).as_ref() == Some(&key))
            .map(|t| t.id)
    }
}

/// A thread-safe in-memory ledger store.
///
/// Sessions stage their writes and publish them atomically on commit. A staged
/// wallet remembers the version it was based on; commit fails with
/// `VersionConflict` when another session committed that wallet first, which
/// gives the same first-committer-wins outcome as the guarded SQL update.
/// `lock_transaction` takes a per-row lock that the session holds until it
/// ends, like `SELECT ... FOR UPDATE`.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a wallet for `user_id` at version 0.
    pub async fn seed_wallet(&self, user_id: Uuid, balance: BigDecimal) -> Wallet {
        let wallet = Wallet::new(user_id, balance);
        self.state
            .write()
            .await
            .wallets
            .insert(wallet.id, wallet.clone());
        wallet
    }

    pub async fn wallet(&self, wallet_id: Uuid) -> Option<Wallet> {
        self.state.read().await.wallets.get(&wallet_id).cloned()
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        let mut all: Vec<Transaction> =
            self.state.read().await.transactions.values().cloned().collect();
        all.sort_by_key(|t| t.created_at);
        all
    }

    /// The next `times` guarded updates of `wallet_id` lose the race to a
    /// simulated concurrent writer that bumps the committed version.
    pub async fn inject_version_conflicts(&self, wallet_id: Uuid, times: u32) {
        self.state
            .write()
            .await
            .injected_conflicts
            .insert(wallet_id, times);
    }

    /// The next `times` transaction inserts fail with a server error.
    pub async fn fail_next_inserts(&self, times: u32) {
        self.state.write().await.failing_inserts = times;
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> LedgerResult<Box<dyn LedgerSession>> {
        Ok(Box::new(InMemoryLedgerSession {
            state: self.state.clone(),
            staged: Staged::default(),
            savepoint: None,
            held: HashMap::new(),
        }))
    }

    async fn create_wallet(&self, wallet: &Wallet) -> LedgerResult<Wallet> {
        let mut state = self.state.write().await;
        if state.wallet_by_user(wallet.user_id).is_some() {
            return Err(LedgerError::Validation(format!(
                "user {} already has a wallet",
                wallet.user_id
            )));
        }
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet.clone())
    }

    async fn find_wallet(&self, wallet_id: Uuid) -> LedgerResult<Option<Wallet>> {
        Ok(self.wallet(wallet_id).await)
    }

    async fn find_wallet_by_user(&self, user_id: Uuid) -> LedgerResult<Option<Wallet>> {
        Ok(self.state.read().await.wallet_by_user(user_id).cloned())
    }

    async fn find_transaction(&self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }
}

#[derive(Clone)]
struct StagedWallet {
    base_version: i64,
    wallet: Wallet,
}

#[derive(Clone, Default)]
struct Staged {
    wallets: HashMap<Uuid, StagedWallet>,
    transactions: HashMap<Uuid, Transaction>,
    inserted: HashSet<Uuid>,
}

pub struct InMemoryLedgerSession {
    state: Arc<RwLock<LedgerState>>,
    staged: Staged,
    savepoint: Option<Staged>,
    held: HashMap<Uuid, OwnedMutexGuard<()>>,
}

impl InMemoryLedgerSession {
    async fn current_wallet(&self, wallet_id: Uuid) -> Option<Wallet> {
        if let Some(staged) = self.staged.wallets.get(&wallet_id) {
            return Some(staged.wallet.clone());
        }
        self.state.read().await.wallets.get(&wallet_id).cloned()
    }

    async fn current_transaction(&self, id: Uuid) -> Option<Transaction> {
        if let Some(tx) = self.staged.transactions.get(&id) {
            return Some(tx.clone());
        }
        self.state.read().await.transactions.get(&id).cloned()
    }
}

#[async_trait]
impl LedgerSession for InMemoryLedgerSession {
    async fn find_wallet(&mut self, wallet_id: Uuid) -> LedgerResult<Option<Wallet>> {
        Ok(self.current_wallet(wallet_id).await)
    }

    async fn find_wallet_by_user(&mut self, user_id: Uuid) -> LedgerResult<Option<Wallet>> {
        if let Some(staged) = self
            .staged
            .wallets
            .values()
            .find(|s| s.wallet.user_id == user_id)
        {
            return Ok(Some(staged.wallet.clone()));
        }
        Ok(self.state.read().await.wallet_by_user(user_id).cloned())
    }

    async fn apply_wallet_delta(
        &mut self,
        wallet_id: Uuid,
        expected_version: i64,
        delta: &BigDecimal,
    ) -> LedgerResult<Wallet> {
        {
            let mut state = self.state.write().await;
            let pending = state.injected_conflicts.get(&wallet_id).copied().unwrap_or(0);
            if pending > 0 {
                state.injected_conflicts.insert(wallet_id, pending - 1);
                if let Some(wallet) = state.wallets.get_mut(&wallet_id) {
                    wallet.version += 1;
                    wallet.updated_at = Utc::now();
                }
                return Err(LedgerError::VersionConflict {
                    wallet_id,
                    expected_version,
                });
            }
        }

        let current = self.current_wallet(wallet_id).await;
        let current = match current {
            Some(w) if w.version == expected_version && (&w.balance + delta) >= BigDecimal::zero() => w,
            other => {
                return Err(classify_rejected_update(
                    wallet_id,
                    expected_version,
                    delta,
                    other.as_ref(),
                ))
            }
        };

        let base_version = self
            .staged
            .wallets
            .get(&wallet_id)
            .map(|s| s.base_version)
            .unwrap_or(current.version);

        let mut updated = current;
        updated.balance = &updated.balance + delta;
        updated.version += 1;
        updated.updated_at = Utc::now();

        self.staged.wallets.insert(
            wallet_id,
            StagedWallet {
                base_version,
                wallet: updated.clone(),
            },
        );
        Ok(updated)
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> LedgerResult<Transaction> {
        {
            let mut state = self.state.write().await;
            if state.failing_inserts > 0 {
                state.failing_inserts -= 1;
                return Err(LedgerError::Server("injected insert failure".to_string()));
            }
            if let Some(existing) = state.duplicate_of(tx) {
                return Err(LedgerError::DuplicateTransaction(format!(
                    "reference order already recorded by transaction {}",
                    existing
                )));
            }
        }

        let staged_duplicate = self
            .staged
            .transactions
            .values()
            .any(|t| t.id != tx.id && dedup_key(t).is_some() && dedup_key(t) == dedup_key(tx));
        if staged_duplicate {
            return Err(LedgerError::DuplicateTransaction(
                "reference order already recorded in this session".to_string(),
            ));
        }

        self.staged.transactions.insert(tx.id, tx.clone());
        self.staged.inserted.insert(tx.id);
        Ok(tx.clone())
    }

    async fn lock_transaction(&mut self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        if !self.held.contains_key(&id) {
            let row_lock = self
                .state
                .write()
                .await
                .row_locks
                .entry(id)
                .or_default()
                .clone();
            self.held.insert(id, row_lock.lock_owned().await);
        }
        Ok(self.current_transaction(id).await)
    }

    async fn update_transaction(
        &mut self,
        id: Uuid,
        update: &TransactionUpdate,
    ) -> LedgerResult<Transaction> {
        let mut tx = self
            .current_transaction(id)
            .await
            .ok_or(LedgerError::TransactionNotFound(id))?;

        tx.status = update.status;
        if update.balance_after.is_some() {
            tx.balance_after = update.balance_after.clone();
        }
        if tx.order_id.is_none() {
            tx.order_id = update.order_id;
        }
        tx.updated_at = Utc::now();

        self.staged.transactions.insert(id, tx.clone());
        Ok(tx)
    }

    async fn savepoint(&mut self) -> LedgerResult<()> {
        self.savepoint = Some(self.staged.clone());
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> LedgerResult<()> {
        match &self.savepoint {
            Some(snapshot) => {
                self.staged = snapshot.clone();
                Ok(())
            }
            None => Err(LedgerError::Server("no savepoint to roll back to".to_string())),
        }
    }

    async fn release_savepoint(&mut self) -> LedgerResult<()> {
        self.savepoint = None;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        // row locks are released only after the writes below are published
        let InMemoryLedgerSession {
            state,
            staged,
            held: _held,
            ..
        } = *self;
        let mut state = state.write().await;

        for (id, pending) in &staged.wallets {
            match state.wallets.get(id) {
                Some(committed) if committed.version == pending.base_version => {}
                Some(_) => {
                    return Err(LedgerError::VersionConflict {
                        wallet_id: *id,
                        expected_version: pending.base_version,
                    })
                }
                None => return Err(LedgerError::WalletNotFound(id.to_string())),
            }
        }

        for id in &staged.inserted {
            if let Some(existing) = state.duplicate_of(&staged.transactions[id]) {
                return Err(LedgerError::DuplicateTransaction(format!(
                    "reference order already recorded by transaction {}",
                    existing
                )));
            }
        }

        for (id, pending) in staged.wallets {
            state.wallets.insert(id, pending.wallet);
        }
        for (id, tx) in staged.transactions {
            state.transactions.insert(id, tx);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> LedgerResult<()> {
        Ok(())
    }
}

/// In-process wallet cache with switchable failure, for tests and local runs.
#[derive(Default, Clone)]
pub struct InMemoryWalletCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryWalletCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with `CacheError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn peek(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone())
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("cache marked as failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletCache for InMemoryWalletCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        Ok(self.peek(key).await)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}
