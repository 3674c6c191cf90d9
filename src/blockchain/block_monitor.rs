use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::LedgerClient;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, RpcError, StorageError};
use crate::logging::{LogContext, MetricsLogger};
use crate::models::{normalize_address, validate_address, Block, Transaction};
use crate::storage::StateStore;

/// Shortest accepted polling period
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct BlockMonitorConfig {
    pub poll_interval: Duration,
    /// Capacity of the live event channel
    pub event_capacity: usize,
}

impl Default for BlockMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            event_capacity: 100,
        }
    }
}

impl From<&MonitorConfig> for BlockMonitorConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            event_capacity: config.event_capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStatus {
    pub last_processed_block: u64,
    pub is_running: bool,
    pub subscriptions: usize,
    /// Set when the engine halted itself instead of being stopped
    pub halt_reason: Option<MonitorError>,
}

struct Lifecycle {
    state: MonitorState,
    events: Option<broadcast::Sender<Transaction>>,
    halt_reason: Option<MonitorError>,
}

/// State shared between the public handle and the polling task
struct Shared {
    store: Arc<dyn StateStore>,
    lifecycle: Mutex<Lifecycle>,
    stop_token: CancellationToken,
}

impl Shared {
    fn new(store: Arc<dyn StateStore>, event_capacity: usize, stop_token: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            store,
            lifecycle: Mutex::new(Lifecycle {
                state: MonitorState::Running,
                events: Some(events),
                halt_reason: None,
            }),
            stop_token,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Transition to `Stopped`; the event sender is dropped exactly once
    fn stop(&self) {
        let closed = {
            let mut lifecycle = self.lifecycle();
            lifecycle.state = MonitorState::Stopped;
            lifecycle.events.take().is_some()
        };
        self.stop_token.cancel();

        if closed {
            info!("Block monitor stopped, live event channel closed");
        }
    }

    fn halt(&self, reason: MonitorError) {
        error!("Block monitor halted: {}", reason);
        self.lifecycle().halt_reason.get_or_insert(reason);
        self.stop();
    }

    /// Best-effort live delivery; never waits for listeners
    fn publish(&self, tx: Transaction) {
        let lifecycle = self.lifecycle();
        let Some(events) = lifecycle.events.as_ref() else {
            return;
        };
        if let Err(broadcast::error::SendError(tx)) = events.send(tx) {
            MetricsLogger::log_event_dropped(&tx.hash);
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<Transaction> {
        match self.lifecycle().events.as_ref() {
            Some(events) => events.subscribe(),
            None => {
                let (closed, receiver) = broadcast::channel(1);
                drop(closed);
                receiver
            }
        }
    }
}

/// Polls the ledger, records transactions touching subscribed addresses
/// and republishes them on a live event channel.
///
/// The polling task starts on construction and runs until [`stop`](Self::stop)
/// is called, the shutdown token is cancelled, or an unrecoverable
/// condition halts it. Reads keep working after the task has ended.
pub struct BlockMonitor {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BlockMonitor {
    /// Spawn the polling task on the current Tokio runtime
    pub fn start(
        client: Arc<dyn LedgerClient>,
        store: Arc<dyn StateStore>,
        config: BlockMonitorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let shared = Arc::new(Shared::new(store, config.event_capacity, shutdown.child_token()));
        let poll_interval = config.poll_interval.max(MIN_POLL_INTERVAL);

        LogContext::new("block_monitor", "start")
            .with_metadata("poll_interval_ms", serde_json::json!(poll_interval.as_millis() as u64))
            .with_metadata("event_capacity", serde_json::json!(config.event_capacity))
            .info("Starting block monitor");

        let task = tokio::spawn(run(client, Arc::clone(&shared), poll_interval));

        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    /// Subscribe to a `0x` + 40 hex digit address.
    /// `false` for malformed addresses and for existing subscriptions.
    pub fn subscribe(&self, address: &str) -> bool {
        let Ok(address) = validate_address(address) else {
            LogContext::new("block_monitor", "subscribe")
                .with_address(address)
                .debug("Rejected malformed address");
            return false;
        };

        let added = self.shared.store.subscribe(&address);
        if added {
            LogContext::new("block_monitor", "subscribe")
                .with_address(&address)
                .info("Subscribed to address");
        }
        added
    }

    pub fn get_transactions(&self, address: &str) -> Vec<Transaction> {
        self.shared.store.get_transactions(&normalize_address(address))
    }

    pub fn get_current_block(&self) -> u64 {
        self.shared.store.get_last_processed_block_num()
    }

    /// Receiver for the live feed. Every receiver sees every event published
    /// after it was created, unless it falls more than the channel capacity
    /// behind. After stop the receiver reports the channel closed.
    pub fn listen(&self) -> broadcast::Receiver<Transaction> {
        self.shared.subscribe_events()
    }

    /// Stop polling and close the live feed. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn state(&self) -> MonitorState {
        self.shared.lifecycle().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    pub fn status(&self) -> MonitorStatus {
        let (is_running, halt_reason) = {
            let lifecycle = self.shared.lifecycle();
            (lifecycle.state == MonitorState::Running, lifecycle.halt_reason.clone())
        };

        MonitorStatus {
            last_processed_block: self.get_current_block(),
            is_running,
            subscriptions: self.shared.store.subscriptions().len(),
            halt_reason,
        }
    }

    /// Wait for the polling task to finish
    pub async fn join(&self) {
        let task = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Block monitor task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for BlockMonitor {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

async fn run(client: Arc<dyn LedgerClient>, shared: Arc<Shared>, poll_interval: Duration) {
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shared.stop_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = shared.stop_token.cancelled() => break,
            outcome = poll_once(client.as_ref(), &shared) => outcome,
        };

        if let Err(reason) = outcome {
            shared.halt(reason);
            break;
        }
    }

    shared.stop();
}

/// One polling cycle.
///
/// Fetch failures that a retry may fix (chain head, exhausted or missing
/// blocks) and a busy store skip the rest of the cycle; progress up to the
/// last complete block is committed first and the next tick resumes there.
/// Conditions that no retry can fix are returned as errors.
async fn poll_once(client: &dyn LedgerClient, shared: &Shared) -> Result<(), MonitorError> {
    let store = shared.store.as_ref();

    let head = match client.fetch_latest_block_number().await {
        Ok(head) => head,
        Err(e) => {
            warn!("Failed to fetch latest block: {}", e);
            return Ok(());
        }
    };
    let latest = head
        .to_u64()
        .map_err(|e| MonitorError::UnusableHead(e.to_string()))?;

    let Some(stored) = store_step("load_cursor", store.load_cursor())? else {
        return Ok(());
    };

    // First run: start at the current head rather than at genesis
    let cursor = if stored == 0 {
        let initial = latest.saturating_sub(1);
        if !persist_cursor(store, initial)? {
            return Ok(());
        }
        initial
    } else {
        stored
    };

    if latest <= cursor {
        return Ok(());
    }

    for height in cursor + 1..=latest {
        let block = match client.fetch_block_by_number(height).await {
            Ok(block) => block,
            Err(e) if is_permanent(&e) => {
                commit_progress(store, cursor, height - 1)?;
                return Err(MonitorError::UnusableBlock {
                    block_number: height,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                LogContext::new("block_monitor", "fetch_block")
                    .with_block_number(height)
                    .warn(&format!("Impossible to retrieve block information, retrying next tick: {}", e));
                return commit_progress(store, cursor, height - 1);
            }
        };

        if !process_block(shared, height, block)? {
            return commit_progress(store, cursor, height - 1);
        }
    }

    persist_cursor(store, latest).map(|_| ())
}

/// Errors that will come back identically on every later attempt
fn is_permanent(error: &RpcError) -> bool {
    !error.is_retryable() && !matches!(error, RpcError::Exhausted { .. } | RpcError::BlockNotFound { .. })
}

/// Returns `Ok(false)` when a busy store interrupted the block; matches
/// appended before the interruption are appended again on the next attempt.
fn process_block(shared: &Shared, height: u64, block: Block) -> Result<bool, MonitorError> {
    let store = shared.store.as_ref();
    let tx_count = block.transactions.len();
    let mut matched = 0;

    for mut tx in block.transactions {
        // Sender wins when both sides are subscribed
        let mut subscriber = None;
        for address in tx.counterparties().map(normalize_address) {
            let Some(subscribed) = store_step("check_subscribed", store.check_subscribed(&address))? else {
                return Ok(false);
            };
            if subscribed {
                subscriber = Some(address);
                break;
            }
        }

        let Some(subscriber) = subscriber else {
            continue;
        };

        tx.subscriber = subscriber.clone();
        let Some(appended) = store_step("append_transaction", store.append_transaction(&subscriber, tx.clone()))?
        else {
            return Ok(false);
        };
        if !appended {
            return Err(MonitorError::StoreRejected {
                address: subscriber,
                hash: tx.hash,
            });
        }

        MetricsLogger::log_transaction_matched(&subscriber, &tx.hash, height);
        shared.publish(tx);
        matched += 1;
    }

    MetricsLogger::log_block_processed(height, tx_count, matched);
    Ok(true)
}

/// `Ok(None)` for a transient store failure, which ends the cycle
fn store_step<T>(operation: &str, result: Result<T, StorageError>) -> Result<Option<T>, MonitorError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_transient() => {
            LogContext::new("block_monitor", operation).warn(&format!("Store busy, retrying next tick: {}", e));
            Ok(None)
        }
        Err(e) => Err(MonitorError::StoreUnavailable {
            operation: operation.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn commit_progress(store: &dyn StateStore, cursor: u64, processed: u64) -> Result<(), MonitorError> {
    if processed > cursor {
        persist_cursor(store, processed)?;
    }
    Ok(())
}

/// `Ok(false)` when the store was busy and the cursor did not move
fn persist_cursor(store: &dyn StateStore, block_number: u64) -> Result<bool, MonitorError> {
    match store.store_cursor(block_number) {
        Ok(()) => Ok(true),
        Err(e) if e.is_transient() => {
            LogContext::new("block_monitor", "store_cursor")
                .with_block_number(block_number)
                .warn(&format!("Store busy, cursor not advanced: {}", e));
            Ok(false)
        }
        Err(e) => {
            error!("Failed to persist cursor at block {}: {}", block_number, e);
            Err(MonitorError::CursorPersist { block_number })
        }
    }
}
