pub mod cli;
pub mod shell;

pub use cli::{write_sample_config, Cli, CliError, CliHandler, Commands};
pub use shell::Shell;
