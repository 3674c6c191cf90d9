use thiserror::Error;

/// Main error type for the transaction tracker
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ledger RPC errors
///
/// Transport failures and the transient status codes are retried by the
/// client; everything else is surfaced to the caller on first sight.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Retryable HTTP status {status}")]
    RetryableStatus { status: u16 },

    #[error("Received non-retryable status code {status}")]
    Status { status: u16 },

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("RPC method error: code={code}, message={message}")]
    Method { code: i64, message: String },

    #[error("No result in response")]
    MissingResult,

    #[error("Block not found: {block_number}")]
    BlockNotFound { block_number: u64 },

    #[error("After {attempts} attempts, last error: {last}")]
    Exhausted { attempts: u32, last: Box<RpcError> },
}

impl RpcError {
    /// Whether another attempt of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::RetryableStatus { .. })
    }

    /// Whether the remote answered but the body could not be understood
    pub fn is_decode(&self) -> bool {
        match self {
            RpcError::Decode(_) | RpcError::MissingResult => true,
            RpcError::Exhausted { last, .. } => last.is_decode(),
            _ => false,
        }
    }
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("Data integrity violation: {0}")]
    Integrity(String),
}

impl StorageError {
    /// Another connection holds the database; the same operation may succeed later
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not readable: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Input validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid Ethereum address: {0}")]
    InvalidAddress(String),

    #[error("Invalid block number: {0}")]
    InvalidBlockNumber(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Conditions that halt the polling engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Impossible to use latest block number: {0}")]
    UnusableHead(String),

    #[error("Storage rejected transaction {hash} for {address}")]
    StoreRejected { address: String, hash: String },

    #[error("Block {block_number} can never be used: {reason}")]
    UnusableBlock { block_number: u64, reason: String },

    #[error("Storage failed during {operation}: {reason}")]
    StoreUnavailable { operation: String, reason: String },

    #[error("Failed to persist cursor at block {block_number}")]
    CursorPersist { block_number: u64 },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The engine cannot make progress
    Critical,
    /// Functionality is degraded until the condition clears
    High,
    /// Transient, usually recovered by a retry
    Medium,
    /// Informational
    Low,
}

impl TrackerError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TrackerError::Monitor(_) => ErrorSeverity::Critical,
            TrackerError::Config(_) => ErrorSeverity::Critical,
            TrackerError::Storage(_) => ErrorSeverity::High,

            TrackerError::Rpc(RpcError::Status { .. }) => ErrorSeverity::High,
            TrackerError::Rpc(RpcError::Method { .. }) => ErrorSeverity::High,
            TrackerError::Rpc(RpcError::Exhausted { .. }) => ErrorSeverity::High,
            TrackerError::Rpc(e) if e.is_decode() => ErrorSeverity::High,
            TrackerError::Rpc(_) => ErrorSeverity::Medium,

            TrackerError::Validation(_) => ErrorSeverity::Low,
            TrackerError::Io(_) => ErrorSeverity::Medium,
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            TrackerError::Rpc(e) => e.is_retryable(),
            TrackerError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RpcError::RetryableStatus { status: 503 }.is_retryable());
        assert!(!RpcError::Status { status: 404 }.is_retryable());
        assert!(!RpcError::MissingResult.is_retryable());
        assert!(!RpcError::Method { code: -32601, message: "Method not found".to_string() }.is_retryable());
    }

    #[test]
    fn test_decode_classification() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert!(RpcError::Decode(json_err).is_decode());
        assert!(RpcError::MissingResult.is_decode());
        assert!(!RpcError::Status { status: 400 }.is_decode());

        let exhausted = RpcError::Exhausted {
            attempts: 5,
            last: Box::new(RpcError::RetryableStatus { status: 502 }),
        };
        assert!(!exhausted.is_decode());
    }

    #[test]
    fn test_error_severity() {
        let critical = TrackerError::Monitor(MonitorError::CursorPersist { block_number: 7 });
        assert_eq!(critical.severity(), ErrorSeverity::Critical);

        let high = TrackerError::Rpc(RpcError::Status { status: 401 });
        assert_eq!(high.severity(), ErrorSeverity::High);

        let medium = TrackerError::Rpc(RpcError::RetryableStatus { status: 429 });
        assert_eq!(medium.severity(), ErrorSeverity::Medium);

        let low = TrackerError::Validation(ValidationError::InvalidAddress("0x123".to_string()));
        assert_eq!(low.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_error_recoverability() {
        assert!(TrackerError::Rpc(RpcError::RetryableStatus { status: 500 }).is_recoverable());
        assert!(!TrackerError::Rpc(RpcError::Status { status: 404 }).is_recoverable());
        assert!(!TrackerError::Config(ConfigError::InvalidUrl("x".to_string())).is_recoverable());
    }

    #[test]
    fn test_storage_transience() {
        let busy = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_transient());
        assert!(TrackerError::Storage(busy).is_recoverable());

        let corrupt = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        ));
        assert!(!corrupt.is_transient());
        assert!(!StorageError::Lock("poisoned".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let error = RpcError::Exhausted {
            attempts: 5,
            last: Box::new(RpcError::RetryableStatus { status: 503 }),
        };
        assert_eq!(
            format!("{}", error),
            "After 5 attempts, last error: Retryable HTTP status 503"
        );

        let wrapped = TrackerError::Rpc(RpcError::Method {
            code: -32601,
            message: "Method not found".to_string(),
        });
        assert_eq!(
            format!("{}", wrapped),
            "RPC error: RPC method error: code=-32601, message=Method not found"
        );
    }
}
