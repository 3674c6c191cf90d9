pub mod block_monitor;
pub mod rpc_client;

pub use block_monitor::{BlockMonitor, BlockMonitorConfig, MonitorState, MonitorStatus};
pub use rpc_client::{is_retryable_status, LedgerClient, RpcClient};
