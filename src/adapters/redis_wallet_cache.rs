use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use crate::ports::{CacheError, WalletCache};

/// Redis-backed wallet snapshot cache.
#[derive(Clone)]
pub struct RedisWalletCache {
    redis_client: redis::Client,
}

impl RedisWalletCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }
}

#[async_trait]
impl WalletCache for RedisWalletCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        // SETEX rejects a zero TTL
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
