use std::io;
use std::sync::{Arc, Mutex};

use log::{error, info};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use eth_tx_tracker::api::Shell;
use eth_tx_tracker::blockchain::{BlockMonitor, BlockMonitorConfig, RpcClient};
use eth_tx_tracker::config::AppConfig;
use eth_tx_tracker::database::SqliteStore;
use eth_tx_tracker::error::Result;
use eth_tx_tracker::logging::{init_logging, ErrorLogger, LogContext};
use eth_tx_tracker::storage::{MemoryStore, StateStore};

#[tokio::main]
async fn main() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config.logging);

    let shutdown = CancellationToken::new();
    let outcome = run(config, shutdown.clone()).await;

    if let Err(e) = &outcome {
        ErrorLogger::log_error(e, Some(LogContext::new("tracker", "main")));
        eprintln!("Error: {}", e);
    }

    // A pending stdin read cannot be interrupted and would block runtime shutdown
    if outcome.is_err() || shutdown.is_cancelled() {
        std::process::exit(i32::from(outcome.is_err()));
    }
}

async fn run(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    info!("Starting Ethereum transaction tracker against {}", config.rpc.endpoint);

    let store: Arc<dyn StateStore> = match config.storage.backend.as_str() {
        "sqlite" => {
            info!("Using SQLite store at {}", config.storage.path);
            Arc::new(SqliteStore::new(&config.storage.path)?)
        }
        _ => Arc::new(MemoryStore::new()),
    };

    let client = Arc::new(RpcClient::from_config(&config.rpc)?);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                println!("\nReceived termination signal, exiting...");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for termination signal: {}", e),
        }
    });

    let monitor = Arc::new(BlockMonitor::start(
        client,
        store,
        BlockMonitorConfig::from(&config.monitor),
        shutdown.clone(),
    ));

    let shell = Shell::new(Arc::clone(&monitor), Arc::new(Mutex::new(io::stdout())));
    let session = shell.run(BufReader::new(tokio::io::stdin()), shutdown).await;

    monitor.stop();
    monitor.join().await;

    let status = monitor.status();
    info!("Tracker stopped at block {}", status.last_processed_block);
    if let Some(reason) = status.halt_reason {
        error!("Polling had halted: {}", reason);
    }

    Ok(session?)
}
