pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod health;
pub mod ports;
pub mod services;
pub mod startup;

use anyhow::Context;
use std::sync::Arc;

use crate::adapters::{HttpOrderGateway, RedisWalletCache};
use crate::config::Config;
use crate::ports::{LedgerStore, OrderGateway, WalletCache};
use crate::services::{CacheInvalidator, RetryPolicy, StatusSynchronizer, TransactionProcessor};

/// The wired ledger services sharing one store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub processor: TransactionProcessor,
    pub status_sync: StatusSynchronizer,
}

/// Wires the services from configuration. Caching and order sync are only
/// enabled when their URLs are set.
pub fn create_app(config: &Config, store: Arc<dyn LedgerStore>) -> anyhow::Result<AppState> {
    let cache = match &config.redis_url {
        Some(url) => {
            let redis: Arc<dyn WalletCache> =
                Arc::new(RedisWalletCache::new(url).context("Failed to create Redis client")?);
            CacheInvalidator::new(redis)
                .with_ttl(config.wallet_cache_ttl())
                .with_prefetch(config.wallet_cache_prefetch)
                .with_call_timeout(config.cache_timeout())
        }
        None => {
            tracing::info!("REDIS_URL not set, wallet cache disabled");
            CacheInvalidator::disabled()
        }
    };

    let orders = config.order_service_url.as_ref().map(|url| {
        tracing::info!("Order service sync enabled at {}", url);
        Arc::new(HttpOrderGateway::new(url.clone())) as Arc<dyn OrderGateway>
    });

    let processor = TransactionProcessor::new(
        store.clone(),
        cache,
        RetryPolicy::new(config.ledger_max_attempts),
    );
    let status_sync = StatusSynchronizer::new(store.clone(), orders);

    Ok(AppState {
        store,
        processor,
        status_sync,
    })
}
