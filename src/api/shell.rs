use std::fmt::Display;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::blockchain::BlockMonitor;
use crate::logging::LogContext;
use crate::models::{normalize_address, Transaction};

const COMMANDS: &str = "Commands:
- subscribe [eth_address]: monitor transactions for a given Ethereum address.
- get_txs [eth_address]: get all transactions stored for a given Ethereum address.
- live [*|eth_address]: show live transactions for all or a specific subscribed Ethereum address.
- block: show the last processed block.
- help: show this list.";

/// Line-oriented interactive front end over a running [`BlockMonitor`].
///
/// An empty line, end of input or the shutdown token ends the session,
/// and ending the session stops the monitor.
pub struct Shell<W> {
    monitor: Arc<BlockMonitor>,
    output: Arc<Mutex<W>>,
}

impl<W: Write + Send + 'static> Shell<W> {
    pub fn new(monitor: Arc<BlockMonitor>, output: Arc<Mutex<W>>) -> Self {
        Self { monitor, output }
    }

    pub async fn run<R>(&self, input: R, shutdown: CancellationToken) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let result = self.session(input.lines(), &shutdown).await;
        self.monitor.stop();

        LogContext::new("shell", "run").debug("Shell session ended");
        result
    }

    async fn session<R>(&self, mut lines: Lines<R>, shutdown: &CancellationToken) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.emit(format!(
            "\nEthereum Transaction Monitor\n\n{}\n\nPress ENTER (without typing a command) at any time to exit.",
            COMMANDS
        ))?;

        loop {
            self.prompt()?;

            let line = tokio::select! {
                _ = shutdown.cancelled() => None,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            if line.is_empty() {
                break;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                [] => {}
                ["subscribe", args @ ..] => self.handle_subscribe(args)?,
                ["get_txs", args @ ..] => self.handle_get_txs(args)?,
                ["live", args @ ..] => {
                    if !self.handle_live(args, &mut lines, shutdown).await? {
                        break;
                    }
                }
                ["block", ..] => self.handle_block()?,
                ["help", ..] => self.emit(COMMANDS)?,
                [command, ..] => self.emit(format!("Unknown command: {}", command))?,
            }
        }

        Ok(())
    }

    fn handle_subscribe(&self, args: &[&str]) -> io::Result<()> {
        let [address] = args else {
            return self.emit("Usage: subscribe [eth_address]");
        };

        if self.monitor.subscribe(address) {
            self.emit(format_args!("Subscribed to {}.", address))
        } else {
            self.emit("Invalid address format or already subscribed to address.")
        }
    }

    fn handle_get_txs(&self, args: &[&str]) -> io::Result<()> {
        let [address] = args else {
            return self.emit("Usage: get_txs [eth_address]");
        };

        let transactions = self.monitor.get_transactions(address);
        let mut out = lock(&self.output);
        if transactions.is_empty() {
            writeln!(
                out,
                "There are still no transactions for {} or you are not subscribed to it.",
                address
            )?;
        } else {
            writeln!(out, "Transactions for {}:", address)?;
            for tx in &transactions {
                write_transaction(&mut *out, tx)?;
            }
        }
        out.flush()
    }

    fn handle_block(&self) -> io::Result<()> {
        let status = self.monitor.status();
        self.emit(format_args!("Last processed block: {}", status.last_processed_block))?;
        if let Some(reason) = status.halt_reason {
            self.emit(format_args!("Polling halted: {}", reason))?;
        }
        Ok(())
    }

    /// Print live events until the next input line. Returns `false` when
    /// input ended or shutdown was requested in the meantime.
    async fn handle_live<R>(
        &self,
        args: &[&str],
        lines: &mut Lines<R>,
        shutdown: &CancellationToken,
    ) -> io::Result<bool>
    where
        R: AsyncBufRead + Unpin,
    {
        let [filter] = args else {
            self.emit("Usage: live [*|eth_address]")?;
            return Ok(true);
        };
        let filter = match *filter {
            "*" => None,
            address => Some(normalize_address(address)),
        };

        let events = self.monitor.listen();
        self.emit("Starting live transaction monitoring... Press ENTER to leave this mode.")?;

        let stop_live = shutdown.child_token();
        let printer = spawn_printer(events, filter, Arc::clone(&self.output), stop_live.clone());

        let next = tokio::select! {
            _ = shutdown.cancelled() => Ok(None),
            line = lines.next_line() => line,
        };

        stop_live.cancel();
        if let Err(e) = printer.await {
            LogContext::new("shell", "live").warn(&format!("Live printer ended abnormally: {}", e));
        }
        self.emit("Stopped live transaction monitoring.")?;

        Ok(next?.is_some())
    }

    fn prompt(&self) -> io::Result<()> {
        let mut out = lock(&self.output);
        write!(out, "\nEnter command: ")?;
        out.flush()
    }

    fn emit(&self, text: impl Display) -> io::Result<()> {
        write_line(&self.output, text)
    }
}

fn spawn_printer<W: Write + Send + 'static>(
    mut events: broadcast::Receiver<Transaction>,
    filter: Option<String>,
    output: Arc<Mutex<W>>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let tx = tokio::select! {
                _ = stop.cancelled() => break,
                event = events.recv() => match event {
                    Ok(tx) => tx,
                    Err(RecvError::Lagged(skipped)) => {
                        if write_line(&output, format!("({} live transactions skipped)", skipped)).is_err() {
                            break;
                        }
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if !matches_filter(&tx, filter.as_deref()) {
                continue;
            }

            let mut out = lock(&output);
            if let Err(e) = write_transaction(&mut *out, &tx) {
                LogContext::new("shell", "live")
                    .with_transaction_hash(&tx.hash)
                    .warn(&format!("Failed to print live transaction: {}", e));
                break;
            }
        }
    })
}

fn matches_filter(tx: &Transaction, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(address) => tx.counterparties().any(|party| normalize_address(party) == address),
    }
}

fn write_transaction<W: Write>(out: &mut W, tx: &Transaction) -> io::Result<()> {
    writeln!(out, "=> Transaction for address [{}]:", tx.subscriber)?;
    writeln!(out, "   Hash: {}", tx.hash)?;
    writeln!(out, "   From: {}", tx.from)?;
    writeln!(out, "   To: {}", tx.to.as_deref().unwrap_or("(contract creation)"))?;
    match tx.eth_amount() {
        Ok(amount) => writeln!(out, "   Amount: {} ETH\n", amount)?,
        Err(_) => writeln!(out, "   Amount: {} wei (unparsed)\n", tx.value)?,
    }
    out.flush()
}

fn write_line<W: Write>(output: &Mutex<W>, text: impl Display) -> io::Result<()> {
    let mut out = lock(output);
    writeln!(out, "{}", text)?;
    out.flush()
}

fn lock<W>(output: &Mutex<W>) -> MutexGuard<'_, W> {
    output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
