mod env;
mod observability;
mod validate;

pub use env::{load_env, Environment};
pub use observability::{LoggingConfig, ObservabilityConfig};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConveyorError, Result};

/// Root configuration for conveyor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConveyorConfig {
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Deployment environment.
    #[serde(default)]
    pub env: Environment,

    /// Dispatcher lifecycle settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Services to register, in order.
    #[serde(default = "default_services")]
    pub services: Vec<ServiceConfig>,

    /// Periodic producer settings.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            env: Environment::default(),
            dispatcher: DispatcherConfig::default(),
            services: default_services(),
            poller: PollerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ConveyorConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConveyorError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| ConveyorError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Look up a service entry by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Project metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name.
    #[serde(default = "default_project_name")]
    pub name: String,

    /// Project version.
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            version: default_version(),
        }
    }
}

fn default_project_name() -> String {
    "conveyor".to_string()
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Dispatcher lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Grace window for workers to finish on shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl DispatcherConfig {
    /// Shutdown grace window as a duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_shutdown_timeout() -> u64 {
    5
}

/// A service queue and the size of its worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name (routing key).
    pub name: String,

    /// Number of workers consuming the queue.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queue capacity.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl ServiceConfig {
    /// Create a service entry.
    pub fn new(name: impl Into<String>, workers: usize, queue_size: usize) -> Self {
        Self {
            name: name.into(),
            workers,
            queue_size,
        }
    }
}

fn default_services() -> Vec<ServiceConfig> {
    vec![ServiceConfig::new("email", default_workers(), default_queue_size())]
}

fn default_workers() -> usize {
    5
}

fn default_queue_size() -> usize {
    100
}

/// Periodic producer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Whether the poller runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tick interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Service the default tick dispatches to.
    #[serde(default = "default_poll_service")]
    pub service: String,

    /// ID given to jobs built by the default tick.
    #[serde(default = "default_poll_job_id")]
    pub job_id: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_poll_interval(),
            service: default_poll_service(),
            job_id: default_poll_job_id(),
        }
    }
}

impl PollerConfig {
    /// Tick interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    500
}

fn default_poll_service() -> String {
    "email".to_string()
}

fn default_poll_job_id() -> String {
    "job-123".to_string()
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConveyorConfig::default();
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0], ServiceConfig::new("email", 5, 100));
        assert_eq!(config.dispatcher.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.poller.interval(), Duration::from_millis(500));
        assert_eq!(config.env, Environment::Development);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = ConveyorConfig::parse_toml("").unwrap();
        assert_eq!(config.project.name, "conveyor");
        assert!(config.service("email").is_some());
        assert!(config.poller.enabled);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            env = "production"

            [project]
            name = "mailer"
            version = "1.0.0"

            [dispatcher]
            shutdown_timeout_secs = 10

            [[services]]
            name = "email"
            workers = 3
            queue_size = 50

            [[services]]
            name = "sms"
            workers = 1

            [poller]
            interval_ms = 250
            service = "sms"
            job_id = "sms-tick"

            [observability.logging]
            level = "debug"
            json_format = true
        "#;

        let config = ConveyorConfig::parse_toml(toml).unwrap();
        assert_eq!(config.project.name, "mailer");
        assert!(config.env.is_production());
        assert_eq!(config.dispatcher.shutdown_timeout_secs, 10);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.service("sms"), Some(&ServiceConfig::new("sms", 1, 100)));
        assert_eq!(config.poller.service, "sms");
        assert_eq!(config.poller.job_id, "sms-tick");
        assert_eq!(config.observability.logging.level, "debug");
        assert!(config.observability.logging.json_format);
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = ConveyorConfig::parse_toml("services = 3");
        assert!(matches!(result, Err(ConveyorError::Config(_))));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CONVEYOR_TEST_SERVICE", "reports");

        let toml = r#"
            [[services]]
            name = "${CONVEYOR_TEST_SERVICE}"
        "#;

        let config = ConveyorConfig::parse_toml(toml).unwrap();
        assert_eq!(config.services[0].name, "reports");

        std::env::remove_var("CONVEYOR_TEST_SERVICE");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conveyor.toml");
        std::fs::write(&path, "[poller]\nenabled = false\n").unwrap();

        let config = ConveyorConfig::from_file(&path).unwrap();
        assert!(!config.poller.enabled);

        let missing = ConveyorConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConveyorError::Config(_))));
    }
}
