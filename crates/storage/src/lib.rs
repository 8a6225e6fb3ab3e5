pub mod conformance;
mod error;
pub mod memory;
mod record;
mod traits;

pub use error::{StorageError, REVIEW_PER_REVIEWER, TRANSACTION_PER_TASK};
pub use memory::MemoryStorage;
pub use record::{TaskFilter, Versioned};
pub use traits::MarketStorage;
