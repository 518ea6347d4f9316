use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Insufficient balance in wallet {wallet_id}: balance {balance}, requested {amount}")]
    InsufficientBalance {
        wallet_id: Uuid,
        balance: BigDecimal,
        amount: BigDecimal,
    },

    #[error("Version conflict on wallet {wallet_id} (expected version {expected_version})")]
    VersionConflict {
        wallet_id: Uuid,
        expected_version: i64,
    },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { attempts: u32 },

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Server(String),
}

impl LedgerError {
    /// Only a lost optimistic race is recovered locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::VersionConflict { .. })
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            // 23505: unique_violation
            if db.code().as_deref() == Some("23505") {
                return LedgerError::DuplicateTransaction(db.message().to_string());
            }
        }
        LedgerError::Database(err)
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_version_conflict_is_retryable() {
        let conflict = LedgerError::VersionConflict {
            wallet_id: Uuid::new_v4(),
            expected_version: 3,
        };
        assert!(conflict.is_retryable());

        let insufficient = LedgerError::InsufficientBalance {
            wallet_id: Uuid::new_v4(),
            balance: BigDecimal::from(50),
            amount: BigDecimal::from(75),
        };
        assert!(!insufficient.is_retryable());
        assert!(!LedgerError::WalletNotFound("w".to_string()).is_retryable());
        assert!(!LedgerError::Server("retries exhausted".to_string()).is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_database_error() {
        let error = LedgerError::from(sqlx::Error::RowNotFound);
        assert!(matches!(error, LedgerError::Database(_)));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_insufficient_balance_message() {
        let id = Uuid::nil();
        let error = LedgerError::InsufficientBalance {
            wallet_id: id,
            balance: "50.00".parse().unwrap(),
            amount: "75.00".parse().unwrap(),
        };
        assert_eq!(
            error.to_string(),
            format!(
                "Insufficient balance in wallet {}: balance 50.00, requested 75.00",
                id
            )
        );
    }
}
