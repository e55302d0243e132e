use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize logging for one process.
///
/// A scan runs several processes per host (the conductor plus N workers),
/// each writing to stdout for the supervisor to collect. `pretty` is for a
/// terminal; `json` is for anything that indexes the stream downstream.
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_level(&config.level)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.format.as_str() == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }

    Ok(())
}

/// Validate the configured level up front so a typo fails startup instead
/// of silently filtering everything out.
fn parse_level(level: &str) -> anyhow::Result<Level> {
    level
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid log level: {level}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_validation() {
        assert_eq!(parse_level("info").expect("valid level"), Level::INFO);
        assert_eq!(parse_level("DEBUG").expect("valid level"), Level::DEBUG);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn test_default_config_level_is_valid() {
        let config = LoggingConfig::default();
        assert!(parse_level(&config.level).is_ok());
    }
}
