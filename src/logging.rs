use log::{debug, error, info, trace, warn, LevelFilter};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

use crate::config::LoggingConfig;
use crate::error::{ErrorSeverity, RpcError, TrackerError};

/// Initialize the global logger from configuration. `RUST_LOG` takes
/// precedence when set.
pub fn init_logging(config: &LoggingConfig) {
    let level = config.level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if config.format == "json" {
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "{}", record.args())
        });
    }
    builder.parse_default_env();

    // Already initialized in tests
    let _ = builder.try_init();
}

/// Structured logging context for the tracker
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with_metadata("block_number", json!(block_number))
    }

    pub fn with_transaction_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("transaction_hash", json!(tx_hash))
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_attempt(self, attempt: u32) -> Self {
        self.with_metadata("attempt", json!(attempt))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let mut log_entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Times a single operation and logs the outcome
pub struct PerformanceMonitor {
    start: Instant,
    operation: String,
    metadata: HashMap<String, Value>,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();

        let mut context = LogContext::new("performance", &self.operation).with_duration_ms(duration);
        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }

        match result {
            Ok(_) => context.trace(&format!("Operation completed successfully in {}ms", duration)),
            Err(e) => {
                context = context.with_metadata("error", json!(e.to_string()));
                context.debug(&format!("Operation failed after {}ms: {}", duration, e));
            }
        }

        duration
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &TrackerError, context: Option<LogContext>) {
        let severity = error.severity();

        let log_context = context
            .unwrap_or_else(|| LogContext::new("error", "unknown"))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        let message = format!("Error occurred: {}", error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log_context.error(&message),
            ErrorSeverity::Medium => log_context.warn(&message),
            ErrorSeverity::Low => log_context.info(&message),
        }
    }

    pub fn log_retry_attempt(operation: &str, error: &RpcError, attempt: u32, max_attempts: u32) {
        let context = LogContext::new("retry", operation)
            .with_attempt(attempt)
            .with_metadata("max_attempts", json!(max_attempts));

        if attempt >= max_attempts {
            context.error(&format!("Final attempt failed: {}", error));
        } else {
            context.warn(&format!("Attempt {} of {} failed: {}", attempt, max_attempts, error));
        }
    }

    pub fn log_recovery_success(operation: &str, attempts: u32, total_duration_ms: u64) {
        let context = LogContext::new("retry", "recovered")
            .with_metadata("operation", json!(operation))
            .with_attempt(attempts)
            .with_duration_ms(total_duration_ms);

        context.info(&format!("Operation recovered after {} attempts in {}ms", attempts, total_duration_ms));
    }
}

/// Operational counters, emitted as structured log records
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_block_processed(block_number: u64, tx_count: usize, matched: usize) {
        let context = LogContext::new("metrics", "block_processed")
            .with_block_number(block_number)
            .with_metadata("transaction_count", json!(tx_count))
            .with_metadata("matched_count", json!(matched));

        context.debug(&format!("Block {} processed: {} transactions, {} matched", block_number, tx_count, matched));
    }

    pub fn log_transaction_matched(subscriber: &str, tx_hash: &str, block_number: u64) {
        let context = LogContext::new("metrics", "transaction_matched")
            .with_address(subscriber)
            .with_transaction_hash(tx_hash)
            .with_block_number(block_number);

        context.info(&format!("Transaction {} attributed to {}", tx_hash, subscriber));
    }

    pub fn log_event_dropped(tx_hash: &str) {
        LogContext::new("metrics", "event_dropped")
            .with_transaction_hash(tx_hash)
            .debug("No live listener for transaction, event dropped");
    }

    pub fn log_rpc_call(method: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "rpc_call")
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.debug(&format!("RPC call {} completed in {}ms", method, duration_ms));
        } else {
            context.warn(&format!("RPC call {} failed after {}ms", method, duration_ms));
        }
    }
}
