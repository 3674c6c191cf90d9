use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppConfig;
use crate::error::{ConfigError, ValidationError};
use crate::models::{normalize_address, validate_address};
use crate::storage::StateStore;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("Already subscribed to {0}")]
    AlreadySubscribed(String),
    #[error("Failed to encode output: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Failed to write output: {0}")]
    Io(#[from] io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "tracker-cli")]
#[command(about = "One-shot queries against the tracker's durable state")]
#[command(version)]
pub struct Cli {
    /// SQLite database path (defaults to the configured storage path)
    #[arg(long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Add an address to the subscription set
    Subscribe {
        /// `0x` followed by 40 hex digits
        address: String,
    },
    /// List transactions recorded for a subscribed address
    Transactions {
        address: String,

        /// Print the raw records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the polling cursor and the subscription set
    Status,
    /// Print a configuration file with every default filled in
    SampleConfig,
}

impl Cli {
    /// `--database` when given, otherwise the configured storage path.
    /// A configuration that fails to load is reported, not replaced by defaults.
    pub fn database_path(&self) -> Result<String, ConfigError> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(AppConfig::load()?.storage.path),
        }
    }
}

impl Commands {
    pub fn needs_store(&self) -> bool {
        !matches!(self, Commands::SampleConfig)
    }
}

pub fn write_sample_config<W: Write>(out: &mut W) -> Result<(), CliError> {
    write!(out, "{}", AppConfig::generate_sample_config()?)?;
    Ok(())
}

pub struct CliHandler {
    store: Arc<dyn StateStore>,
}

impl CliHandler {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn execute_command<W: Write>(&self, command: &Commands, out: &mut W) -> Result<(), CliError> {
        match command {
            Commands::Subscribe { address } => self.subscribe(address, out),
            Commands::Transactions { address, json } => self.transactions(address, *json, out),
            Commands::Status => self.status(out),
            Commands::SampleConfig => write_sample_config(out),
        }
    }

    fn subscribe<W: Write>(&self, address: &str, out: &mut W) -> Result<(), CliError> {
        let address = validate_address(address)?;
        if !self.store.subscribe(&address) {
            return Err(CliError::AlreadySubscribed(address));
        }
        writeln!(out, "Subscribed to {}.", address)?;
        Ok(())
    }

    fn transactions<W: Write>(&self, address: &str, json: bool, out: &mut W) -> Result<(), CliError> {
        let address = normalize_address(address);
        let transactions = self.store.get_transactions(&address);

        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(&transactions)?)?;
            return Ok(());
        }

        if transactions.is_empty() {
            writeln!(out, "No transactions recorded for {}.", address)?;
            return Ok(());
        }

        writeln!(out, "{} transaction(s) for {}:", transactions.len(), address)?;
        for tx in &transactions {
            let amount = tx.eth_amount().unwrap_or_else(|_| format!("{} wei", tx.value));
            writeln!(
                out,
                "  {}  block {}  {} -> {}  {} ETH",
                tx.hash,
                tx.block_number,
                tx.from,
                tx.to.as_deref().unwrap_or("(contract creation)"),
                amount
            )?;
        }
        Ok(())
    }

    fn status<W: Write>(&self, out: &mut W) -> Result<(), CliError> {
        let subscriptions = self.store.subscriptions();

        writeln!(out, "Last processed block: {}", self.store.get_last_processed_block_num())?;
        writeln!(out, "Subscriptions: {}", subscriptions.len())?;
        for address in &subscriptions {
            writeln!(out, "  {}", address)?;
        }
        Ok(())
    }
}
