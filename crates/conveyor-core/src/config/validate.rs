use std::collections::HashSet;

use super::observability::LOG_LEVELS;
use super::ConveyorConfig;
use crate::error::{ConveyorError, Result};

/// Upper bound on workers per service.
pub const MAX_WORKERS_PER_SERVICE: usize = 1024;

/// Poller intervals below this are suspicious outside development.
const MIN_PRODUCTION_POLL_INTERVAL_MS: u64 = 10;

type Check = fn(&ConveyorConfig) -> Result<()>;

impl ConveyorConfig {
    /// Validate the configuration, failing on the first hard error.
    ///
    /// Non-fatal issues are logged as warnings.
    pub fn validate(&self) -> Result<()> {
        let checks: &[Check] = &[
            validate_service_names,
            validate_service_sizes,
            validate_poller,
            validate_shutdown_timeout,
            validate_log_level,
        ];

        for check in checks {
            check(self)?;
        }

        self.log_warnings();
        Ok(())
    }

    fn log_warnings(&self) {
        for service in &self.services {
            if service.workers == 0 {
                tracing::warn!(
                    service = %service.name,
                    "Service has no workers; dispatched jobs will queue until it fills"
                );
            }
        }

        if self.env.is_production()
            && self.poller.enabled
            && self.poller.interval_ms < MIN_PRODUCTION_POLL_INTERVAL_MS
        {
            tracing::warn!(
                interval_ms = self.poller.interval_ms,
                "Very short poller interval in production"
            );
        }
    }
}

fn validate_service_names(config: &ConveyorConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for service in &config.services {
        if service.name.trim().is_empty() {
            return Err(ConveyorError::Config(
                "service name cannot be empty".to_string(),
            ));
        }
        if !seen.insert(service.name.as_str()) {
            return Err(ConveyorError::Config(format!(
                "service '{}' is listed more than once",
                service.name
            )));
        }
    }
    Ok(())
}

fn validate_service_sizes(config: &ConveyorConfig) -> Result<()> {
    for service in &config.services {
        if service.workers > MAX_WORKERS_PER_SERVICE {
            return Err(ConveyorError::Config(format!(
                "service '{}': workers ({}) exceeds the maximum of {}",
                service.name, service.workers, MAX_WORKERS_PER_SERVICE
            )));
        }
    }
    Ok(())
}

fn validate_poller(config: &ConveyorConfig) -> Result<()> {
    let poller = &config.poller;
    if !poller.enabled {
        return Ok(());
    }
    if poller.interval_ms == 0 {
        return Err(ConveyorError::Config(
            "poller.interval_ms must be greater than 0".to_string(),
        ));
    }
    if config.service(&poller.service).is_none() {
        return Err(ConveyorError::Config(format!(
            "poller.service '{}' is not a configured service",
            poller.service
        )));
    }
    Ok(())
}

fn validate_shutdown_timeout(config: &ConveyorConfig) -> Result<()> {
    if config.dispatcher.shutdown_timeout_secs == 0 {
        return Err(ConveyorError::Config(
            "dispatcher.shutdown_timeout_secs must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_log_level(config: &ConveyorConfig) -> Result<()> {
    let logging = &config.observability.logging;
    let is_directive = logging.level.contains('=') || logging.level.contains(',');
    if is_directive || logging.is_plain_level() {
        return Ok(());
    }
    Err(ConveyorError::Config(format!(
        "unknown log level '{}', expected one of {}",
        logging.level,
        LOG_LEVELS.join(", ")
    )))
}
