pub mod in_memory;
pub mod order_client;
pub mod postgres_ledger_store;
pub mod redis_wallet_cache;

pub use in_memory::{InMemoryLedgerStore, InMemoryWalletCache};
pub use order_client::HttpOrderGateway;
pub use postgres_ledger_store::PostgresLedgerStore;
pub use redis_wallet_cache::RedisWalletCache;

use bigdecimal::{BigDecimal, Zero};
use uuid::Uuid;

use crate::domain::Wallet;
use crate::error::LedgerError;

/// Explains why a version-guarded update matched no row, given the row as it
/// reads now. A stale version wins over a short balance so the caller retries
/// with fresh state before judging funds.
pub(crate) fn classify_rejected_update(
    wallet_id: Uuid,
    expected_version: i64,
    delta: &BigDecimal,
    current: Option<&Wallet>,
) -> LedgerError {
    match current {
        None => LedgerError::WalletNotFound(wallet_id.to_string()),
        Some(wallet) if wallet.version != expected_version => LedgerError::VersionConflict {
            wallet_id,
            expected_version,
        },
        Some(wallet) if (&wallet.balance + delta) < BigDecimal::zero() => {
            LedgerError::InsufficientBalance {
                wallet_id,
                balance: wallet.balance.clone(),
                amount: delta.abs(),
            }
        }
        Some(_) => LedgerError::VersionConflict {
            wallet_id,
            expected_version,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(balance: &str, version: i64) -> Wallet {
        let mut w = Wallet::new(Uuid::new_v4(), balance.parse().unwrap());
        w.version = version;
        w
    }

    #[test]
    fn test_missing_row_is_wallet_not_found() {
        let id = Uuid::new_v4();
        let err = classify_rejected_update(id, 0, &BigDecimal::from(-10), None);
        assert!(matches!(err, LedgerError::WalletNotFound(_)));
    }

    #[test]
    fn test_stale_version_is_conflict_even_when_short() {
        let w = wallet("5.00", 2);
        let err = classify_rejected_update(w.id, 1, &BigDecimal::from(-10), Some(&w));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_current_version_with_short_balance_is_insufficient() {
        let w = wallet("5.00", 1);
        let err = classify_rejected_update(w.id, 1, &BigDecimal::from(-10), Some(&w));
        match err {
            LedgerError::InsufficientBalance { amount, .. } => {
                assert_eq!(amount, BigDecimal::from(10))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
