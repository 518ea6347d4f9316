pub mod transaction;
pub mod wallet;

pub use transaction::{
    Destination, DestinationType, OrderPaymentStatus, Transaction, TransactionSource,
    TransactionStatus, TransactionType, TransferRequest,
};
pub use wallet::Wallet;
