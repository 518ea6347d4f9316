//! Transaction domain entity.
//! Framework-agnostic representation of a ledger transaction.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Purchase,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdraw => "WITHDRAW",
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Refund => "REFUND",
        }
    }

    /// Types that take money out of the source wallet.
    pub fn debits_source(&self) -> bool {
        matches!(self, TransactionType::Withdraw | TransactionType::Purchase)
    }

    /// Types that put money into the destination wallet.
    pub fn credits_destination(&self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::Purchase)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAW" => Ok(TransactionType::Withdraw),
            "PURCHASE" => Ok(TransactionType::Purchase),
            "REFUND" => Ok(TransactionType::Refund),
            other => Err(LedgerError::Validation(format!(
                "unknown transaction type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    /// Payment status pushed to the order collaborator for this ledger status.
    pub fn order_payment_status(&self) -> OrderPaymentStatus {
        match self {
            TransactionStatus::Completed => OrderPaymentStatus::Paid,
            TransactionStatus::Failed | TransactionStatus::Cancelled => OrderPaymentStatus::Failed,
            TransactionStatus::Pending => OrderPaymentStatus::Pending,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            other => Err(LedgerError::Validation(format!(
                "unknown transaction status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionSource {
    ExternalPaymentProvider,
    Wallet,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::ExternalPaymentProvider => "EXTERNAL_PAYMENT_PROVIDER",
            TransactionSource::Wallet => "WALLET",
        }
    }
}

impl fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionSource {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EXTERNAL_PAYMENT_PROVIDER" => Ok(TransactionSource::ExternalPaymentProvider),
            "WALLET" => Ok(TransactionSource::Wallet),
            other => Err(LedgerError::Validation(format!(
                "unknown transaction source: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationType {
    Wallet,
    User,
}

impl DestinationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationType::Wallet => "WALLET",
            DestinationType::User => "USER",
        }
    }
}

impl FromStr for DestinationType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WALLET" => Ok(DestinationType::Wallet),
            "USER" => Ok(DestinationType::User),
            other => Err(LedgerError::Validation(format!(
                "unknown destination type: {}",
                other
            ))),
        }
    }
}

/// Where a credited transfer lands.
///
/// The discriminant is explicit; a wallet id and a user id are never
/// interpreted from the same field by guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Destination {
    Wallet(Uuid),
    User(Uuid),
}

impl Destination {
    /// Legacy interpretation of a bare destination id: PURCHASE pays a user,
    /// everything else targets a wallet directly.
    pub fn for_type(transaction_type: TransactionType, id: Uuid) -> Self {
        match transaction_type {
            TransactionType::Purchase => Destination::User(id),
            _ => Destination::Wallet(id),
        }
    }

    pub fn from_parts(id: Uuid, destination_type: DestinationType) -> Self {
        match destination_type {
            DestinationType::Wallet => Destination::Wallet(id),
            DestinationType::User => Destination::User(id),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Destination::Wallet(id) | Destination::User(id) => *id,
        }
    }

    pub fn destination_type(&self) -> DestinationType {
        match self {
            Destination::Wallet(_) => DestinationType::Wallet,
            Destination::User(_) => DestinationType::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "PENDING",
            OrderPaymentStatus::Paid => "PAID",
            OrderPaymentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain entity representing a persisted ledger transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    pub balance_after: Option<BigDecimal>,
    pub status: TransactionStatus,
    pub source: TransactionSource,
    pub destination: Option<Destination>,
    pub order_id: Option<Uuid>,
    pub reference_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn destination_type(&self) -> Option<DestinationType> {
        self.destination.map(|d| d.destination_type())
    }

    /// Balance of the affected wallet after this transaction, derived from the
    /// wallet's balance before it.
    pub fn projected_balance(&self, balance_before: &BigDecimal) -> BigDecimal {
        match self.transaction_type {
            TransactionType::Deposit | TransactionType::Refund => balance_before + &self.amount,
            TransactionType::Withdraw | TransactionType::Purchase => balance_before - &self.amount,
        }
    }
}

/// Input for creating a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub user_id: Uuid,
    pub fwallet_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    /// Advisory only; recomputed from the committed mutation.
    pub balance_after: Option<BigDecimal>,
    pub status: TransactionStatus,
    pub source: TransactionSource,
    pub destination: Option<Destination>,
    pub order_id: Option<Uuid>,
    pub reference_order_id: Option<Uuid>,
}

impl TransferRequest {
    pub fn new(
        user_id: Uuid,
        transaction_type: TransactionType,
        amount: BigDecimal,
        source: TransactionSource,
    ) -> Self {
        Self {
            user_id,
            fwallet_id: None,
            transaction_type,
            amount,
            balance_after: None,
            status: TransactionStatus::Completed,
            source,
            destination: None,
            order_id: None,
            reference_order_id: None,
        }
    }

    pub fn from_wallet(mut self, wallet_id: Uuid) -> Self {
        self.fwallet_id = Some(wallet_id);
        self
    }

    pub fn to(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_reference_order(mut self, reference_order_id: Uuid) -> Self {
        self.reference_order_id = Some(reference_order_id);
        self
    }

    /// Rejects requests that can never succeed regardless of store state.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= BigDecimal::from(0) {
            return Err(LedgerError::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        let needs_source =
            self.transaction_type.debits_source() || self.transaction_type == TransactionType::Refund;
        if needs_source && self.fwallet_id.is_none() {
            return Err(LedgerError::Validation(format!(
                "{} requires a source wallet",
                self.transaction_type
            )));
        }

        if self.transaction_type.credits_destination() && self.destination.is_none() {
            return Err(LedgerError::Validation(format!(
                "{} requires a destination",
                self.transaction_type
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_status_to_order_payment_status() {
        assert_eq!(
            TransactionStatus::Completed.order_payment_status(),
            OrderPaymentStatus::Paid
        );
        assert_eq!(
            TransactionStatus::Failed.order_payment_status(),
            OrderPaymentStatus::Failed
        );
        assert_eq!(
            TransactionStatus::Cancelled.order_payment_status(),
            OrderPaymentStatus::Failed
        );
        assert_eq!(
            TransactionStatus::Pending.order_payment_status(),
            OrderPaymentStatus::Pending
        );
    }

    #[test]
    fn test_legacy_destination_inference() {
        let id = Uuid::new_v4();
        assert_eq!(
            Destination::for_type(TransactionType::Purchase, id),
            Destination::User(id)
        );
        assert_eq!(
            Destination::for_type(TransactionType::Deposit, id),
            Destination::Wallet(id)
        );
    }

    #[test]
    fn test_enum_round_trip_through_strings() {
        for t in [
            TransactionType::Deposit,
            TransactionType::Withdraw,
            TransactionType::Purchase,
            TransactionType::Refund,
        ] {
            assert_eq!(t.as_str().parse::<TransactionType>().unwrap(), t);
        }
        assert_eq!(
            "external_payment_provider".parse::<TransactionSource>().unwrap(),
            TransactionSource::ExternalPaymentProvider
        );
        assert!("SHIPPED".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_amount() {
        let req = TransferRequest::new(
            Uuid::new_v4(),
            TransactionType::Withdraw,
            amount("0"),
            TransactionSource::Wallet,
        )
        .from_wallet(Uuid::new_v4());

        assert!(matches!(req.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_validate_requires_wallets_by_type() {
        let withdraw = TransferRequest::new(
            Uuid::new_v4(),
            TransactionType::Withdraw,
            amount("10"),
            TransactionSource::Wallet,
        );
        assert!(withdraw.validate().is_err());

        let deposit = TransferRequest::new(
            Uuid::new_v4(),
            TransactionType::Deposit,
            amount("10"),
            TransactionSource::ExternalPaymentProvider,
        );
        assert!(deposit.validate().is_err());
        assert!(deposit
            .to(Destination::Wallet(Uuid::new_v4()))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_projected_balance_by_type() {
        let now = Utc::now();
        let mut tx = Transaction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            transaction_type: TransactionType::Withdraw,
            amount: amount("40.00"),
            balance_after: None,
            status: TransactionStatus::Pending,
            source: TransactionSource::Wallet,
            destination: None,
            order_id: None,
            reference_order_id: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(tx.projected_balance(&amount("100.00")), amount("60.00"));

        tx.transaction_type = TransactionType::Refund;
        assert_eq!(tx.projected_balance(&amount("100.00")), amount("140.00"));
    }
}
