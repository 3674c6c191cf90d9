pub mod api;
pub mod blockchain;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;
pub mod storage;

pub use blockchain::{BlockMonitor, BlockMonitorConfig, LedgerClient, MonitorState, MonitorStatus, RpcClient};
pub use config::{AppConfig, LoggingConfig, MonitorConfig, RpcConfig, StorageConfig};
pub use database::SqliteStore;
pub use error::{ConfigError, MonitorError, Result, RpcError, StorageError, TrackerError, ValidationError};
pub use logging::{init_logging, ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use models::{Block, BlockNumber, Transaction};
pub use retry::{RetryConfig, RetryManager};
pub use storage::{MemoryStore, StateStore};
