use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus, TransactionType};
use crate::error::{LedgerError, LedgerResult};
use crate::ports::{LedgerSession, LedgerStore, OrderGateway, TransactionUpdate};

/// Moves a transaction between statuses and mirrors the outcome onto the
/// order it pays for.
#[derive(Clone)]
pub struct StatusSynchronizer {
    store: Arc<dyn LedgerStore>,
    orders: Option<Arc<dyn OrderGateway>>,
}

impl StatusSynchronizer {
    pub fn new(store: Arc<dyn LedgerStore>, orders: Option<Arc<dyn OrderGateway>>) -> Self {
        Self { store, orders }
    }

    /// Repeating an update that is already in effect changes nothing and
    /// sends no second notification.
    pub async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
        order_id: Option<Uuid>,
    ) -> LedgerResult<Transaction> {
        let mut session = self.store.begin().await?;

        let (transaction, changed) =
            match apply_status(session.as_mut(), transaction_id, status, order_id).await {
                Ok(applied) => applied,
                Err(e) => {
                    if let Err(rb) = session.rollback().await {
                        warn!(transaction_id = %transaction_id, error = %rb, "rollback failed");
                    }
                    return Err(e);
                }
            };

        session.commit().await?;

        if changed {
            info!(
                transaction_id = %transaction.id,
                status = %transaction.status,
                "transaction status updated"
            );
            self.notify_order(&transaction).await;
        } else {
            debug!(transaction_id = %transaction.id, "status update already in effect");
        }

        Ok(transaction)
    }

    /// Targets the persisted order id; a later argument never replaces it.
    async fn notify_order(&self, transaction: &Transaction) {
        if transaction.transaction_type != TransactionType::Purchase {
            return;
        }
        let Some(order_id) = transaction.order_id else {
            return;
        };
        let Some(orders) = &self.orders else {
            debug!(order_id = %order_id, "order sync disabled, skipping payment status push");
            return;
        };

        let payment_status = transaction.status.order_payment_status();
        match orders.set_order_payment_status(order_id, payment_status).await {
            Ok(()) => info!(
                order_id = %order_id,
                payment_status = %payment_status,
                "order payment status synchronized"
            ),
            Err(e) => warn!(
                order_id = %order_id,
                payment_status = %payment_status,
                error = %e,
                "failed to synchronize order payment status"
            ),
        }
    }
}

/// Returns the stored row and whether anything the order cares about changed.
async fn apply_status(
    session: &mut dyn LedgerSession,
    transaction_id: Uuid,
    status: TransactionStatus,
    order_id: Option<Uuid>,
) -> LedgerResult<(Transaction, bool)> {
    let current = session
        .lock_transaction(transaction_id)
        .await?
        .ok_or(LedgerError::TransactionNotFound(transaction_id))?;

    let needs_backfill = status == TransactionStatus::Completed && current.balance_after.is_none();
    let attaches_order = order_id.is_some() && current.order_id.is_none();
    if current.status == status && !needs_backfill && !attaches_order {
        return Ok((current, false));
    }

    // Projected, not committed: a REFUND never credited the wallet on create.
    let balance_after = if needs_backfill {
        let wallet = session
            .find_wallet(current.wallet_id)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(current.wallet_id.to_string()))?;
        Some(current.projected_balance(&wallet.balance))
    } else {
        None
    };

    let update = TransactionUpdate {
        status,
        balance_after,
        order_id,
    };
    let updated = session.update_transaction(transaction_id, &update).await?;
    let changed = current.status != status || attaches_order;
    Ok((updated, changed))
}
