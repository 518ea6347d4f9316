use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::wallet::cache_key_for_user;
use crate::domain::Wallet;
use crate::error::{LedgerError, LedgerResult};
use crate::ports::{CacheError, LedgerStore, WalletCache};

pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 3600);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(250);

/// Best-effort maintenance of the wallet snapshot cache.
///
/// Nothing here returns a cache error to the caller: faults and timeouts are
/// logged and dropped.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Option<Arc<dyn WalletCache>>,
    ttl: Duration,
    prefetch: bool,
    call_timeout: Duration,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn WalletCache>) -> Self {
        Self {
            cache: Some(cache),
            ttl: DEFAULT_TTL,
            prefetch: true,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// No cache configured; every operation is a no-op.
    pub fn disabled() -> Self {
        Self {
            cache: None,
            ttl: DEFAULT_TTL,
            prefetch: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.call_timeout)),
        }
    }

    /// Evicts the snapshot of every wallet and, with prefetch on, stores the
    /// fresh state in its place.
    pub async fn refresh(&self, wallets: &[Wallet]) {
        let Some(cache) = &self.cache else {
            return;
        };

        for wallet in wallets {
            let key = wallet.cache_key();
            if self.prefetch && self.holds_newer(cache.as_ref(), wallet).await {
                debug!(key = %key, version = wallet.version, "cached wallet snapshot is newer, keeping it");
                continue;
            }
            if let Err(e) = self.bounded(cache.delete(&key)).await {
                warn!(key = %key, error = %e, "failed to evict wallet snapshot");
                continue;
            }

            if self.prefetch {
                if let Err(e) = self.store_snapshot(cache.as_ref(), wallet).await {
                    warn!(key = %key, error = %e, "failed to prefetch wallet snapshot");
                }
            }
        }
    }

    /// A refresh that finishes late must not overwrite a later transfer's snapshot.
    async fn holds_newer(&self, cache: &dyn WalletCache, wallet: &Wallet) -> bool {
        match self.bounded(cache.get(&wallet.cache_key())).await {
            Ok(Some(raw)) => serde_json::from_str::<Wallet>(&raw)
                .map(|cached| cached.version > wallet.version)
                .unwrap_or(false),
            _ => false,
        }
    }

    async fn store_snapshot(&self, cache: &dyn WalletCache, wallet: &Wallet) -> Result<(), CacheError> {
        let value = serde_json::to_string(wallet)?;
        self.bounded(cache.set(&wallet.cache_key(), &value, self.ttl))
            .await
    }

    /// Read-through lookup of a user's wallet. The store stays authoritative:
    /// a cache miss, fault or undecodable entry falls back to it.
    pub async fn wallet_for_user(
        &self,
        store: &dyn LedgerStore,
        user_id: Uuid,
    ) -> LedgerResult<Wallet> {
        if let Some(cache) = &self.cache {
            let key = cache_key_for_user(user_id);
            match self.bounded(cache.get(&key)).await {
                Ok(Some(raw)) => match serde_json::from_str::<Wallet>(&raw) {
                    Ok(wallet) => {
                        debug!(key = %key, "wallet snapshot cache hit");
                        return Ok(wallet);
                    }
                    Err(e) => warn!(key = %key, error = %e, "discarding undecodable wallet snapshot"),
                },
                Ok(None) => debug!(key = %key, "wallet snapshot cache miss"),
                Err(e) => warn!(key = %key, error = %e, "wallet cache read failed"),
            }
        }

        let wallet = store
            .find_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(format!("no wallet for user {}", user_id)))?;

        if let Some(cache) = &self.cache {
            if let Err(e) = self.store_snapshot(cache.as_ref(), &wallet).await {
                warn!(user_id = %user_id, error = %e, "failed to populate wallet snapshot");
            }
        }

        Ok(wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryLedgerStore, InMemoryWalletCache};

    fn amount(s: &str) -> bigdecimal::BigDecimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_refresh_replaces_stale_snapshot() {
        let cache = InMemoryWalletCache::new();
        let invalidator = CacheInvalidator::new(Arc::new(cache.clone()));

        let mut wallet = Wallet::new(Uuid::new_v4(), amount("100.00"));
        invalidator.refresh(std::slice::from_ref(&wallet)).await;

        wallet.balance = amount("60.00");
        wallet.version = 1;
        invalidator.refresh(std::slice::from_ref(&wallet)).await;

        let raw = cache.peek(&wallet.cache_key()).await.unwrap();
        let cached: Wallet = serde_json::from_str(&raw).unwrap();
        assert_eq!(cached.balance, amount("60.00"));
        assert_eq!(cached.version, 1);
    }

    #[tokio::test]
    async fn test_late_refresh_keeps_newer_snapshot() {
        let cache = InMemoryWalletCache::new();
        let invalidator = CacheInvalidator::new(Arc::new(cache.clone()));

        let older = Wallet::new(Uuid::new_v4(), amount("90.00"));
        let mut newer = older.clone();
        newer.balance = amount("80.00");
        newer.version = 2;

        invalidator.refresh(std::slice::from_ref(&newer)).await;
        invalidator.refresh(std::slice::from_ref(&older)).await;

        let raw = cache.peek(&newer.cache_key()).await.unwrap();
        let cached: Wallet = serde_json::from_str(&raw).unwrap();
        assert_eq!(cached.version, 2);
        assert_eq!(cached.balance, amount("80.00"));
    }

    #[tokio::test]
    async fn test_refresh_without_prefetch_only_evicts() {
        let cache = InMemoryWalletCache::new();
        let wallet = Wallet::new(Uuid::new_v4(), amount("10.00"));
        cache
            .set(&wallet.cache_key(), "stale", Duration::from_secs(60))
            .await
            .unwrap();

        CacheInvalidator::new(Arc::new(cache.clone()))
            .with_prefetch(false)
            .refresh(std::slice::from_ref(&wallet))
            .await;

        assert!(cache.peek(&wallet.cache_key()).await.is_none());
    }

    #[tokio::test]
    async fn test_failing_cache_is_swallowed() {
        let cache = InMemoryWalletCache::new();
        cache.set_failing(true);
        let invalidator = CacheInvalidator::new(Arc::new(cache));

        let wallet = Wallet::new(Uuid::new_v4(), amount("10.00"));
        invalidator.refresh(&[wallet]).await;
    }

    #[tokio::test]
    async fn test_read_through_populates_then_hits() {
        let store = InMemoryLedgerStore::new();
        let user = Uuid::new_v4();
        let seeded = store.seed_wallet(user, amount("42.00")).await;

        let cache = InMemoryWalletCache::new();
        let invalidator = CacheInvalidator::new(Arc::new(cache.clone()));

        let first = invalidator.wallet_for_user(&store, user).await.unwrap();
        assert_eq!(first, seeded);
        assert!(cache.peek(&seeded.cache_key()).await.is_some());

        // a served-from-cache read no longer needs the wallet row
        let second = invalidator
            .wallet_for_user(&InMemoryLedgerStore::new(), user)
            .await
            .unwrap();
        assert_eq!(second.id, seeded.id);
    }

    #[tokio::test]
    async fn test_read_through_falls_back_when_cache_fails() {
        let store = InMemoryLedgerStore::new();
        let user = Uuid::new_v4();
        store.seed_wallet(user, amount("1.00")).await;

        let cache = InMemoryWalletCache::new();
        cache.set_failing(true);
        let invalidator = CacheInvalidator::new(Arc::new(cache));

        assert!(invalidator.wallet_for_user(&store, user).await.is_ok());
        assert!(matches!(
            invalidator.wallet_for_user(&store, Uuid::new_v4()).await,
            Err(LedgerError::WalletNotFound(_))
        ));
    }
}
