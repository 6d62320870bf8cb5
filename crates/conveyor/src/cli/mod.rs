mod run;
mod validate;

pub use run::RunCommand;
pub use validate::ValidateCommand;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};

use conveyor_core::config::ConveyorConfig;

/// Conveyor - in-process job dispatcher
#[derive(Parser)]
#[command(name = "conveyor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the dispatcher and poller until interrupted.
    Run(RunCommand),

    /// Check a configuration file without running.
    Validate(ValidateCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::Validate(cmd) => cmd.execute(),
        }
    }
}

/// Load `path`, or defaults when it does not exist.
///
/// The flag reports whether defaults were used.
pub(crate) fn load_config(path: &str) -> Result<(ConveyorConfig, bool)> {
    if !Path::new(path).exists() {
        return Ok((ConveyorConfig::default(), true));
    }
    Ok((ConveyorConfig::from_file(path)?, false))
}
