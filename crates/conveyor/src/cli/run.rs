use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::{info, warn};

use conveyor::Conveyor;
use conveyor_core::config::{load_env, Environment};

use super::load_config;
use crate::logging;

/// Run the dispatcher and poller.
#[derive(Parser)]
pub struct RunCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "conveyor.toml")]
    pub config: String,

    /// Enable development mode (verbose logging).
    #[arg(long)]
    pub dev: bool,

    /// Do not start the poller.
    #[arg(long)]
    pub no_poller: bool,
}

impl RunCommand {
    /// Execute the run command.
    pub async fn execute(self) -> Result<()> {
        // Logging is configured from the file, which may reference
        // variables the dotenv file provides.
        let dotenv = load_env();

        let (mut config, defaulted) = load_config(&self.config)?;
        if std::env::var("APP_ENV").is_ok() {
            config.env = Environment::from_env();
        }

        logging::init(&config.observability.logging, self.dev);

        println!();
        println!(
            "  {}  {} v{}",
            style("▶").bold(),
            style("CONVEYOR").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!();

        info!(env = %config.env, "Loaded environment");
        match dotenv {
            Some(path) => info!(path = %path.display(), "Loaded dotenv file"),
            None => warn!("No .env file found"),
        }
        if defaulted {
            warn!(path = %self.config, "Configuration file not found, using defaults");
        } else {
            info!("Loaded configuration from {}", self.config);
        }

        for service in &config.services {
            println!(
                "  {} {} ({} workers, queue {})",
                style("•").bold(),
                style(&service.name).cyan(),
                service.workers,
                service.queue_size
            );
        }
        if self.no_poller || !config.poller.enabled {
            println!("  {} Poller disabled", style("⏸").bold());
        } else {
            println!(
                "  {} Polling every {}ms into {}",
                style("⏱").bold(),
                config.poller.interval_ms,
                style(&config.poller.service).cyan()
            );
        }
        if self.dev {
            println!("  {} Development mode enabled", style("🔧").bold());
        }
        println!();

        let conveyor = Conveyor::builder()
            .config(config)
            .poller(!self.no_poller)
            .build()?;

        conveyor.run().await?;

        println!("\n  {} Goodbye!", style("👋").bold());

        Ok(())
    }
}
