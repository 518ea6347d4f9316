//! Wallet domain entity.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's balance plus the version counter guarding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid, balance: BigDecimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_cover(&self, amount: &BigDecimal) -> bool {
        &self.balance >= amount
    }

    /// Cache key for the snapshot of this wallet, keyed by its owner.
    pub fn cache_key(&self) -> String {
        cache_key_for_user(self.user_id)
    }
}

pub fn cache_key_for_user(user_id: Uuid) -> String {
    format!("wallet:{}", user_id)
}
