use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::logging::LogContext;
use crate::models::Transaction;
use crate::storage::StateStore;

#[derive(Default)]
struct MemoryState {
    subscribers: HashSet<String>,
    transactions: HashMap<String, Vec<Transaction>>,
    last_processed_block: u64,
}

/// Volatile store; everything is lost when the process exits
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the maps half-updated:
        // every mutation is a single insert or push.
        self.state.lock().unwrap_or_else(|poisoned| {
            LogContext::new("memory_store", "lock").warn("Recovering poisoned store lock");
            poisoned.into_inner()
        })
    }
}

impl StateStore for MemoryStore {
    fn subscribe(&self, address: &str) -> bool {
        self.lock().subscribers.insert(address.to_string())
    }

    fn is_subscribed(&self, address: &str) -> bool {
        self.lock().subscribers.contains(address)
    }

    fn add_transaction(&self, address: &str, tx: Transaction) -> bool {
        let mut state = self.lock();
        if !state.subscribers.contains(address) {
            return false;
        }
        state.transactions.entry(address.to_string()).or_default().push(tx);
        true
    }

    fn get_transactions(&self, address: &str) -> Vec<Transaction> {
        self.lock().transactions.get(address).cloned().unwrap_or_default()
    }

    fn set_last_processed_block_num(&self, block_number: u64) -> bool {
        self.lock().last_processed_block = block_number;
        true
    }

    fn get_last_processed_block_num(&self) -> u64 {
        self.lock().last_processed_block
    }

    fn subscriptions(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.lock().subscribers.iter().cloned().collect();
        addresses.sort();
        addresses
    }
}
