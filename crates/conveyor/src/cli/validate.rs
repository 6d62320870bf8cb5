use anyhow::Result;
use clap::Parser;
use console::style;

use super::load_config;

/// Check a configuration file.
#[derive(Parser)]
pub struct ValidateCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "conveyor.toml")]
    pub config: String,
}

impl ValidateCommand {
    /// Execute the validate command.
    pub fn execute(self) -> Result<()> {
        let (config, defaulted) = load_config(&self.config)?;
        if defaulted {
            println!(
                "  {} {} not found, checking defaults",
                style("!").yellow().bold(),
                self.config
            );
        }

        if let Err(e) = config.validate() {
            println!("  {} {}", style("✗").red().bold(), e);
            anyhow::bail!("invalid configuration: {}", self.config);
        }

        println!(
            "  {} {} is valid ({} services, env {})",
            style("✓").green().bold(),
            self.config,
            config.services.len(),
            config.env
        );
        Ok(())
    }
}
