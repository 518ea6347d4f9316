pub mod retry;
pub mod status_sync;
pub mod transaction_processor;
pub mod wallet_cache;
pub mod wallet_mutator;

pub use retry::{AttemptOutcome, RetryPolicy};
pub use status_sync::StatusSynchronizer;
pub use transaction_processor::{TransactionProcessor, TransferOutcome};
pub use wallet_cache::CacheInvalidator;
