use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "argusd", about = "Polling-based configuration-file watcher daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon in the foreground until interrupted.
    Start(StartArgs),
    /// Parse and validate a config file without starting the daemon.
    Validate(ValidateArgs),
    /// Write a default config file to disk.
    Config(ConfigArgs),
}

#[derive(Parser)]
pub struct StartArgs {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "argus.toml")]
    pub config: PathBuf,
    /// Enable debug-level logging regardless of the config's logging.level.
    #[arg(long)]
    pub debug: bool,
}

#[derive(Parser)]
pub struct ValidateArgs {
    #[arg(short, long, default_value = "argus.toml")]
    pub config: PathBuf,
}

#[derive(Parser)]
pub struct ConfigArgs {
    /// Where to write the generated config.
    #[arg(short, long, default_value = "argus.toml")]
    pub output: PathBuf,
    /// Overwrite the output path if it already exists.
    #[arg(short, long)]
    pub force: bool,
}
