//! Turns a transfer request into one persisted ledger row plus up to two
//! version-guarded wallet mutations, retried as a unit on version conflicts.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::retry::{AttemptOutcome, RetryPolicy};
use super::wallet_cache::CacheInvalidator;
use super::wallet_mutator;
use crate::domain::{Destination, Transaction, TransactionType, TransferRequest, Wallet};
use crate::error::{LedgerError, LedgerResult};
use crate::ports::{LedgerSession, LedgerStore};

/// Result of a committed (or, in nested mode, staged) transfer.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub transaction: Transaction,
    /// Wallets mutated by the transfer, as they read after the mutation.
    pub touched_wallets: Vec<Wallet>,
    pub attempts: u32,
}

/// Everything an attempt needs; survives across retries so the transaction
/// id and creation time stay stable.
#[derive(Debug, Clone)]
struct TransferPlan {
    request: TransferRequest,
    transaction_id: Uuid,
    created_at: DateTime<Utc>,
    expected_versions: HashMap<Uuid, i64>,
}

impl TransferPlan {
    fn new(request: TransferRequest) -> Self {
        Self {
            request,
            transaction_id: Uuid::new_v4(),
            created_at: Utc::now(),
            expected_versions: HashMap::new(),
        }
    }

    fn observe(&mut self, wallet: &Wallet) {
        self.expected_versions.insert(wallet.id, wallet.version);
    }

    fn check_version(&self, wallet: &Wallet) -> LedgerResult<()> {
        match self.expected_versions.get(&wallet.id) {
            Some(&expected) if expected != wallet.version => Err(LedgerError::VersionConflict {
                wallet_id: wallet.id,
                expected_version: expected,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
struct StagedTransfer {
    transaction: Transaction,
    touched: Vec<Wallet>,
}

#[derive(Clone)]
pub struct TransactionProcessor {
    store: Arc<dyn LedgerStore>,
    cache: CacheInvalidator,
    retry: RetryPolicy,
}

impl TransactionProcessor {
    pub fn new(store: Arc<dyn LedgerStore>, cache: CacheInvalidator, retry: RetryPolicy) -> Self {
        Self {
            store,
            cache,
            retry,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn cache(&self) -> &CacheInvalidator {
        &self.cache
    }

    /// Creates a transfer in its own store transaction and refreshes the
    /// wallet cache once it has committed.
    pub async fn create_transaction(&self, request: TransferRequest) -> LedgerResult<TransferOutcome> {
        self.run_owned(request, None).await
    }

    /// Same as [`create_transaction`](Self::create_transaction), but gives up
    /// with `DeadlineExceeded` once `deadline` passes between attempts.
    pub async fn create_transaction_until(
        &self,
        request: TransferRequest,
        deadline: Instant,
    ) -> LedgerResult<TransferOutcome> {
        self.run_owned(request, Some(deadline)).await
    }

    /// Stages a transfer inside a session the caller owns. Each attempt runs
    /// under a savepoint; nothing is committed here.
    ///
    /// The caller commits the session and then passes the outcome to
    /// [`refresh_cache`](Self::refresh_cache).
    pub async fn create_transaction_in(
        &self,
        session: &mut dyn LedgerSession,
        request: TransferRequest,
    ) -> LedgerResult<TransferOutcome> {
        request.validate()?;
        let mut plan = TransferPlan::new(request);
        if let Some(source_id) = seeded_source(&plan.request) {
            if let Some(wallet) = session.find_wallet(source_id).await? {
                plan.observe(&wallet);
            }
        }

        let (staged, attempts) = self
            .retry
            .run(None, (plan, session), |(plan, session), n| {
                attempt_nested(plan, session, n)
            })
            .await?;

        debug!(
            transaction_id = %staged.transaction.id,
            attempts,
            "transfer staged in caller session"
        );

        Ok(TransferOutcome {
            transaction: staged.transaction,
            touched_wallets: staged.touched,
            attempts,
        })
    }

    /// Evicts (and optionally re-populates) the snapshots of every wallet the
    /// transfer touched. Never fails.
    pub async fn refresh_cache(&self, outcome: &TransferOutcome) {
        self.cache.refresh(&outcome.touched_wallets).await;
    }

    async fn run_owned(
        &self,
        request: TransferRequest,
        deadline: Option<Instant>,
    ) -> LedgerResult<TransferOutcome> {
        request.validate()?;
        let mut plan = TransferPlan::new(request);
        if let Some(source_id) = seeded_source(&plan.request) {
            if let Some(wallet) = self.store.find_wallet(source_id).await? {
                plan.observe(&wallet);
            }
        }

        let (staged, attempts) = self
            .retry
            .run(deadline, plan, move |plan, n| self.attempt_owned(plan, n))
            .await?;

        info!(
            transaction_id = %staged.transaction.id,
            transaction_type = %staged.transaction.transaction_type,
            amount = %staged.transaction.amount,
            wallet_id = %staged.transaction.wallet_id,
            attempts,
            "transfer committed"
        );

        let outcome = TransferOutcome {
            transaction: staged.transaction,
            touched_wallets: staged.touched,
            attempts,
        };
        self.refresh_cache(&outcome).await;
        Ok(outcome)
    }

    async fn attempt_owned(
        &self,
        plan: TransferPlan,
        attempt: u32,
    ) -> AttemptOutcome<StagedTransfer, TransferPlan> {
        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(e) => return AttemptOutcome::Fail(e),
        };

        let staged = match stage(session.as_mut(), &plan).await {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(rb) = session.rollback().await {
                    warn!(transaction_id = %plan.transaction_id, error = %rb, "rollback failed");
                }
                return self.after_failure(plan, e, attempt).await;
            }
        };

        match session.commit().await {
            Ok(()) => AttemptOutcome::Done(staged),
            Err(e) => self.after_failure(plan, e, attempt).await,
        }
    }

    async fn after_failure(
        &self,
        mut plan: TransferPlan,
        err: LedgerError,
        attempt: u32,
    ) -> AttemptOutcome<StagedTransfer, TransferPlan> {
        let wallet_id = match err {
            LedgerError::VersionConflict { wallet_id, .. } => wallet_id,
            other => return AttemptOutcome::Fail(other),
        };
        debug!(wallet_id = %wallet_id, attempt, "version conflict, re-reading wallet");

        match self.store.find_wallet(wallet_id).await {
            Ok(Some(fresh)) => {
                plan.observe(&fresh);
                AttemptOutcome::Retry(plan)
            }
            Ok(None) => AttemptOutcome::Fail(LedgerError::WalletNotFound(wallet_id.to_string())),
            Err(e) => AttemptOutcome::Fail(e),
        }
    }
}

/// The wallet whose version is pinned before the first attempt.
fn seeded_source(request: &TransferRequest) -> Option<Uuid> {
    if request.transaction_type.debits_source() {
        request.fwallet_id
    } else {
        None
    }
}

async fn attempt_nested<'s>(
    mut plan: TransferPlan,
    session: &'s mut dyn LedgerSession,
    attempt: u32,
) -> AttemptOutcome<StagedTransfer, (TransferPlan, &'s mut dyn LedgerSession)> {
    if let Err(e) = session.savepoint().await {
        return AttemptOutcome::Fail(e);
    }

    let err = match stage(session, &plan).await {
        Ok(staged) => {
            return match session.release_savepoint().await {
                Ok(()) => AttemptOutcome::Done(staged),
                Err(e) => AttemptOutcome::Fail(e),
            };
        }
        Err(e) => e,
    };

    if let Err(e) = session.rollback_to_savepoint().await {
        return AttemptOutcome::Fail(e);
    }
    if let Err(e) = session.release_savepoint().await {
        return AttemptOutcome::Fail(e);
    }

    let wallet_id = match err {
        LedgerError::VersionConflict { wallet_id, .. } => wallet_id,
        other => return AttemptOutcome::Fail(other),
    };
    debug!(wallet_id = %wallet_id, attempt, "version conflict in nested transfer, re-reading wallet");

    match session.find_wallet(wallet_id).await {
        Ok(Some(fresh)) => {
            plan.observe(&fresh);
            AttemptOutcome::Retry((plan, session))
        }
        Ok(None) => AttemptOutcome::Fail(LedgerError::WalletNotFound(wallet_id.to_string())),
        Err(e) => AttemptOutcome::Fail(e),
    }
}

/// One attempt's writes: debit, credit, then the ledger row.
async fn stage(session: &mut dyn LedgerSession, plan: &TransferPlan) -> LedgerResult<StagedTransfer> {
    let request = &plan.request;
    let mut touched: Vec<Wallet> = Vec::with_capacity(2);

    let source = match request.fwallet_id {
        Some(id) => Some(
            session
                .find_wallet(id)
                .await?
                .ok_or_else(|| LedgerError::WalletNotFound(id.to_string()))?,
        ),
        None => None,
    };

    if request.transaction_type.debits_source() {
        let mut source = source.clone().ok_or_else(|| {
            LedgerError::Validation(format!("{} requires a source wallet", request.transaction_type))
        })?;
        plan.check_version(&source)?;
        if !source.can_cover(&request.amount) {
            return Err(LedgerError::InsufficientBalance {
                wallet_id: source.id,
                balance: source.balance.clone(),
                amount: request.amount.clone(),
            });
        }
        wallet_mutator::debit(session, &mut source, &request.amount).await?;
        touched.push(source);
    }

    let mut credited: Option<Uuid> = None;
    if request.transaction_type.credits_destination() {
        let destination = request.destination.ok_or_else(|| {
            LedgerError::Validation(format!("{} requires a destination", request.transaction_type))
        })?;
        let found = resolve_destination(session, destination).await?;

        // the same wallet may already carry this attempt's debit
        let position = touched.iter().position(|w| w.id == found.id);
        let mut target = match position {
            Some(i) => touched[i].clone(),
            None => {
                plan.check_version(&found)?;
                found
            }
        };
        wallet_mutator::credit(session, &mut target, &request.amount).await?;
        credited = Some(target.id);
        match position {
            Some(i) => touched[i] = target,
            None => touched.push(target),
        }
    }

    let (wallet_id, balance_after) = match request.transaction_type {
        TransactionType::Deposit => {
            let id = credited.ok_or_else(|| LedgerError::Server("deposit credited no wallet".to_string()))?;
            (id, balance_of(&touched, id))
        }
        TransactionType::Withdraw | TransactionType::Purchase => {
            let id = source
                .as_ref()
                .map(|w| w.id)
                .ok_or_else(|| LedgerError::Server("debit without source wallet".to_string()))?;
            (id, balance_of(&touched, id))
        }
        TransactionType::Refund => {
            let wallet = source.as_ref().ok_or_else(|| {
                LedgerError::Validation("REFUND requires a source wallet".to_string())
            })?;
            (wallet.id, request.balance_after.clone())
        }
    };

    let transaction = Transaction {
        id: plan.transaction_id,
        user_id: request.user_id,
        wallet_id,
        transaction_type: request.transaction_type,
        amount: request.amount.clone(),
        balance_after,
        status: request.status,
        source: request.source,
        destination: request.destination,
        order_id: request.order_id,
        reference_order_id: request.reference_order_id,
        created_at: plan.created_at,
        updated_at: Utc::now(),
    };
    let transaction = session.insert_transaction(&transaction).await?;

    Ok(StagedTransfer {
        transaction,
        touched,
    })
}

async fn resolve_destination(
    session: &mut dyn LedgerSession,
    destination: Destination,
) -> LedgerResult<Wallet> {
    match destination {
        Destination::Wallet(id) => session
            .find_wallet(id)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(id.to_string())),
        Destination::User(user_id) => session
            .find_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(format!("no wallet for user {}", user_id))),
    }
}

fn balance_of(wallets: &[Wallet], id: Uuid) -> Option<bigdecimal::BigDecimal> {
    wallets.iter().find(|w| w.id == id).map(|w| w.balance.clone())
}
