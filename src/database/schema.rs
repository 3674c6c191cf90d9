use rusqlite::{Connection, Result};

/// Initialize the database schema with required tables
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            address TEXT PRIMARY KEY,
            created_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    // Append-only log; the autoincrement id preserves discovery order
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subscriber TEXT NOT NULL REFERENCES subscriptions(address),
            transaction_hash TEXT NOT NULL,
            block_number TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cursor (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_processed_block INTEGER NOT NULL DEFAULT 0,
            last_updated INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_subscriber ON transactions(subscriber)",
        [],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO cursor (id, last_processed_block) VALUES (1, 0)",
        [],
    )?;

    Ok(())
}
