use conveyor_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level; `--dev` raises the default
/// to `debug`.
pub fn init(config: &LoggingConfig, dev: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config, dev)));

    if config.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn default_directive(config: &LoggingConfig, dev: bool) -> String {
    if dev {
        "debug".to_string()
    } else {
        config.level.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let config = LoggingConfig {
            level: "conveyor=trace,warn".to_string(),
            json_format: false,
        };
        assert_eq!(default_directive(&config, false), "conveyor=trace,warn");
        assert_eq!(default_directive(&config, true), "debug");
    }
}
