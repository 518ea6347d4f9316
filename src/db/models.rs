use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{Destination, Transaction, Wallet};
use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.id,
            user_id: row.user_id,
            balance: row.balance,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Row type for the `transactions` table; enums are stored as text.
#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub transaction_type: String,
    pub amount: BigDecimal,
    pub balance_after: Option<BigDecimal>,
    pub status: String,
    pub source: String,
    pub destination: Option<Uuid>,
    pub destination_type: Option<String>,
    pub order_id: Option<Uuid>,
    pub reference_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRow {
    pub fn into_domain(self) -> LedgerResult<Transaction> {
        let destination = match (self.destination, self.destination_type) {
            (Some(id), Some(kind)) => Some(Destination::from_parts(id, kind.parse()?)),
            (None, None) => None,
            _ => {
                return Err(LedgerError::Server(format!(
                    "transaction {} has a partial destination",
                    self.id
                )))
            }
        };

        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            wallet_id: self.wallet_id,
            transaction_type: self.transaction_type.parse()?,
            amount: self.amount,
            balance_after: self.balance_after,
            status: self.status.parse()?,
            source: self.source.parse()?,
            destination,
            order_id: self.order_id,
            reference_order_id: self.reference_order_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
