use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

use crate::database::schema::initialize_schema;
use crate::error::StorageError;
use crate::logging::LogContext;
use crate::models::Transaction;
use crate::storage::StateStore;

/// Durable state store backed by SQLite.
///
/// A single connection behind a mutex; each contract operation holds the
/// lock for its whole read-modify-write sequence. Backend failures are
/// logged and reported through the contract's `false` / empty / `0` values.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize the schema
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        initialize_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Lock("Failed to acquire connection lock".to_string()))
    }

    fn try_subscribe(&self, address: &str) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO subscriptions (address) VALUES (?1)",
            params![address],
        )?;
        Ok(inserted == 1)
    }

    fn try_is_subscribed(&self, address: &str) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        Ok(is_subscribed_locked(&conn, address)?)
    }

    fn try_add_transaction(&self, address: &str, tx: &Transaction) -> Result<bool, StorageError> {
        let payload = serde_json::to_string(tx).map_err(|e| StorageError::Integrity(e.to_string()))?;

        let conn = self.lock()?;
        if !is_subscribed_locked(&conn, address)? {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO transactions (subscriber, transaction_hash, block_number, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![address, tx.hash, tx.block_number, payload],
        )?;
        Ok(true)
    }

    fn try_get_transactions(&self, address: &str) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT payload FROM transactions WHERE subscriber = ?1 ORDER BY id")?;

        let payloads = stmt
            .query_map(params![address], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(|e| StorageError::Integrity(e.to_string())))
            .collect()
    }

    fn try_set_cursor(&self, block_number: u64) -> Result<(), StorageError> {
        let value = i64::try_from(block_number)
            .map_err(|_| StorageError::Integrity(format!("block number {} out of range", block_number)))?;

        let conn = self.lock()?;
        conn.execute(
            "UPDATE cursor SET last_processed_block = ?1, last_updated = strftime('%s', 'now') WHERE id = 1",
            params![value],
        )?;
        Ok(())
    }

    fn try_get_cursor(&self) -> Result<u64, StorageError> {
        let conn = self.lock()?;
        let value: Option<i64> = conn
            .query_row("SELECT last_processed_block FROM cursor WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        Ok(value.unwrap_or(0).max(0) as u64)
    }

    fn try_subscriptions(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT address FROM subscriptions ORDER BY address")?;
        let addresses = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(addresses)
    }
}

fn is_subscribed_locked(conn: &Connection, address: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM subscriptions WHERE address = ?1",
        params![address],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

fn report<T>(operation: &str, result: Result<T, StorageError>, fallback: T) -> T {
    result.unwrap_or_else(|e| {
        LogContext::new("sqlite_store", operation).error(&format!("Storage operation failed: {}", e));
        fallback
    })
}

impl StateStore for SqliteStore {
    fn subscribe(&self, address: &str) -> bool {
        report("subscribe", self.try_subscribe(address), false)
    }

    fn is_subscribed(&self, address: &str) -> bool {
        report("is_subscribed", self.try_is_subscribed(address), false)
    }

    fn add_transaction(&self, address: &str, tx: Transaction) -> bool {
        report("add_transaction", self.try_add_transaction(address, &tx), false)
    }

    fn get_transactions(&self, address: &str) -> Vec<Transaction> {
        report("get_transactions", self.try_get_transactions(address), Vec::new())
    }

    fn set_last_processed_block_num(&self, block_number: u64) -> bool {
        report("set_cursor", self.try_set_cursor(block_number).map(|_| true), false)
    }

    fn get_last_processed_block_num(&self) -> u64 {
        report("get_cursor", self.try_get_cursor(), 0)
    }

    fn subscriptions(&self) -> Vec<String> {
        report("subscriptions", self.try_subscriptions(), Vec::new())
    }

    fn check_subscribed(&self, address: &str) -> Result<bool, StorageError> {
        self.try_is_subscribed(address)
    }

    fn append_transaction(&self, address: &str, tx: Transaction) -> Result<bool, StorageError> {
        self.try_add_transaction(address, &tx)
    }

    fn load_cursor(&self) -> Result<u64, StorageError> {
        self.try_get_cursor()
    }

    fn store_cursor(&self, block_number: u64) -> Result<(), StorageError> {
        self.try_set_cursor(block_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tx(hash: &str, from: &str) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            from: from.to_string(),
            to: Some("0xdef456".to_string()),
            block_number: "0x2".to_string(),
            value: "0x5af3107a4000".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_database_creation() {
        let store = SqliteStore::new_in_memory().expect("Failed to create in-memory database");
        assert_eq!(store.get_last_processed_block_num(), 0);
        assert!(store.subscriptions().is_empty());
    }

    #[test]
    fn test_subscribe_and_append() {
        let store = SqliteStore::new_in_memory().unwrap();

        assert!(!store.add_transaction("0xabc123", tx("0x1", "0xabc123")));
        assert!(store.subscribe("0xabc123"));
        assert!(!store.subscribe("0xabc123"));
        assert!(store.is_subscribed("0xabc123"));

        let mut first = tx("0x1", "0xabc123");
        first.subscriber = "0xabc123".to_string();
        assert!(store.add_transaction("0xabc123", first.clone()));
        assert!(store.add_transaction("0xabc123", tx("0x2", "0xabc123")));

        let stored = store.get_transactions("0xabc123");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], first);
        assert_eq!(stored[1].hash, "0x2");
        assert!(store.get_transactions("0xother").is_empty());
    }

    #[test]
    fn test_cursor_round_trip() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.set_last_processed_block_num(12345));
        assert_eq!(store.get_last_processed_block_num(), 12345);
    }

    #[test]
    fn test_locked_database_reports_transient_failures() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("tracker.db");
        let db_path = db_path.to_str().unwrap();

        let store = SqliteStore::new(db_path).unwrap();
        store.subscribe("0xabc123");
        store.set_last_processed_block_num(5);

        let holder = Connection::open(db_path).unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let cursor = store.load_cursor().unwrap_err();
        assert!(cursor.is_transient(), "{}", cursor);
        assert!(store.check_subscribed("0xabc123").unwrap_err().is_transient());

        holder.execute_batch("COMMIT").unwrap();
        assert_eq!(store.load_cursor().unwrap(), 5);
        assert!(store.check_subscribed("0xabc123").unwrap());
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("tracker.db");
        let db_path = db_path.to_str().unwrap();

        {
            let store = SqliteStore::new(db_path).unwrap();
            store.subscribe("0xabc123");
            store.add_transaction("0xabc123", tx("0x1", "0xabc123"));
            store.set_last_processed_block_num(42);
        }

        let reopened = SqliteStore::new(db_path).unwrap();
        assert!(reopened.is_subscribed("0xabc123"));
        assert_eq!(reopened.get_transactions("0xabc123").len(), 1);
        assert_eq!(reopened.get_last_processed_block_num(), 42);
        assert_eq!(reopened.subscriptions(), vec!["0xabc123".to_string()]);
    }
}
