use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::{QueueError, QueueResult};

/// 初始化日志系统
///
/// `RUST_LOG` wins over `log_level` when it is set. Fails if a global
/// subscriber is already installed or the format is unknown.
pub fn init_logging(log_level: &str, log_format: &str) -> QueueResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| {
                QueueError::Configuration(format!("Failed to initialize JSON logging: {e}"))
            }),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| {
                QueueError::Configuration(format!("Failed to initialize pretty logging: {e}"))
            }),
        other => Err(QueueError::Configuration(format!(
            "Unsupported log format: {other}"
        ))),
    }
}

pub fn init_logging_from_config(config: &LoggingConfig) -> QueueResult<()> {
    init_logging(&config.level, &config.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = init_logging("info", "xml").unwrap_err();
        assert!(matches!(err, QueueError::Configuration(_)));
    }
}
