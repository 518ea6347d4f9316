//! The single path through which a wallet balance changes.

use bigdecimal::{BigDecimal, Zero};
use tracing::debug;

use crate::domain::Wallet;
use crate::error::{LedgerError, LedgerResult};
use crate::ports::LedgerSession;

/// Applies a signed `delta` to `wallet` through the session's version-guarded
/// update and replaces the caller's copy with the committed-to-be row.
///
/// A debit that would go negative is refused before any write is issued.
pub async fn apply_delta(
    session: &mut dyn LedgerSession,
    wallet: &mut Wallet,
    delta: &BigDecimal,
) -> LedgerResult<()> {
    if (&wallet.balance + delta) < BigDecimal::zero() {
        return Err(LedgerError::InsufficientBalance {
            wallet_id: wallet.id,
            balance: wallet.balance.clone(),
            amount: delta.abs(),
        });
    }

    let updated = session
        .apply_wallet_delta(wallet.id, wallet.version, delta)
        .await?;

    debug!(
        wallet_id = %updated.id,
        delta = %delta,
        version = updated.version,
        balance = %updated.balance,
        "wallet mutation staged"
    );

    *wallet = updated;
    Ok(())
}

pub async fn debit(
    session: &mut dyn LedgerSession,
    wallet: &mut Wallet,
    amount: &BigDecimal,
) -> LedgerResult<()> {
    apply_delta(session, wallet, &(-amount.clone())).await
}

pub async fn credit(
    session: &mut dyn LedgerSession,
    wallet: &mut Wallet,
    amount: &BigDecimal,
) -> LedgerResult<()> {
    apply_delta(session, wallet, amount).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLedgerStore;
    use crate::ports::LedgerStore;
    use uuid::Uuid;

    fn amount(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_debit_refreshes_caller_copy() {
        let store = InMemoryLedgerStore::new();
        let mut wallet = store.seed_wallet(Uuid::new_v4(), amount("100.00")).await;

        let mut session = store.begin().await.unwrap();
        debit(session.as_mut(), &mut wallet, &amount("40.00"))
            .await
            .unwrap();

        assert_eq!(wallet.balance, amount("60.00"));
        assert_eq!(wallet.version, 1);
    }

    #[tokio::test]
    async fn test_overdraft_is_refused_without_write() {
        let store = InMemoryLedgerStore::new();
        let mut wallet = store.seed_wallet(Uuid::new_v4(), amount("50.00")).await;

        let mut session = store.begin().await.unwrap();
        let err = debit(session.as_mut(), &mut wallet, &amount("75.00"))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(wallet.version, 0);
        session.commit().await.unwrap();
        assert_eq!(store.wallet(wallet.id).await.unwrap().balance, amount("50.00"));
    }

    #[tokio::test]
    async fn test_stale_copy_yields_version_conflict() {
        let store = InMemoryLedgerStore::new();
        let mut stale = store.seed_wallet(Uuid::new_v4(), amount("100.00")).await;

        let mut session = store.begin().await.unwrap();
        let mut fresh = stale.clone();
        credit(session.as_mut(), &mut fresh, &amount("5.00"))
            .await
            .unwrap();

        let err = credit(session.as_mut(), &mut stale, &amount("5.00"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_wallet() {
        let store = InMemoryLedgerStore::new();
        let mut ghost = Wallet::new(Uuid::new_v4(), amount("10.00"));

        let mut session = store.begin().await.unwrap();
        let err = credit(session.as_mut(), &mut ghost, &amount("1.00"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::WalletNotFound(_)));
    }
}
