pub mod memory;

pub use memory::MemoryStore;

use crate::error::StorageError;
use crate::models::Transaction;

/// Process state owned by the tracker: subscriptions, the per-address
/// transaction log and the last-processed-block cursor.
///
/// Every operation is atomic with respect to every other one. Implementations
/// must never call back into the engine or the ledger client while holding
/// their lock.
pub trait StateStore: Send + Sync {
    /// Insert `address`; `false` if it was already subscribed
    fn subscribe(&self, address: &str) -> bool;

    fn is_subscribed(&self, address: &str) -> bool;

    /// Append `tx` to the log of `address`; `false` (and no append) if the
    /// address is not subscribed
    fn add_transaction(&self, address: &str, tx: Transaction) -> bool;

    /// Transactions in discovery order; empty for unknown addresses
    fn get_transactions(&self, address: &str) -> Vec<Transaction>;

    fn set_last_processed_block_num(&self, block_number: u64) -> bool;

    /// Cursor value; 0 means never initialized
    fn get_last_processed_block_num(&self) -> u64;

    /// All subscribed addresses, sorted
    fn subscriptions(&self) -> Vec<String>;

    // Fallible forms used by the polling engine; backends that can fail
    // override them.

    fn check_subscribed(&self, address: &str) -> Result<bool, StorageError> {
        Ok(self.is_subscribed(address))
    }

    fn append_transaction(&self, address: &str, tx: Transaction) -> Result<bool, StorageError> {
        Ok(self.add_transaction(address, tx))
    }

    fn load_cursor(&self) -> Result<u64, StorageError> {
        Ok(self.get_last_processed_block_num())
    }

    fn store_cursor(&self, block_number: u64) -> Result<(), StorageError> {
        if self.set_last_processed_block_num(block_number) {
            Ok(())
        } else {
            Err(StorageError::Integrity(format!("cursor write of block {} rejected", block_number)))
        }
    }
}
