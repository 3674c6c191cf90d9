use clap::Parser;
use std::sync::Arc;

use eth_tx_tracker::api::{write_sample_config, Cli, CliHandler};
use eth_tx_tracker::database::SqliteStore;

fn main() {
    // Quieter than the tracker itself
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();

    if !cli.command.needs_store() {
        if let Err(e) = write_sample_config(&mut stdout) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let db_path = match cli.database_path() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store = match SqliteStore::new(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Failed to open database at '{}': {}", db_path, e);
            std::process::exit(1);
        }
    };

    let handler = CliHandler::new(store);
    if let Err(e) = handler.execute_command(&cli.command, &mut stdout) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
