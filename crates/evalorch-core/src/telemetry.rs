//! Tracing setup for evalorch processes.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::OrchestratorConfig;

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` overrides `EVALORCH_LOG_LEVEL`. JSON output flattens event
/// fields to the top level so `event = "..."` is a plain key. Returns
/// `false` when a subscriber was already installed.
pub fn init(config: &OrchestratorConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(config.log_level).into())
    });
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.log_json {
        registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(false)).try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = OrchestratorConfig {
            log_json: true,
            ..Default::default()
        };
        init(&config);
        assert!(!init(&OrchestratorConfig::default()));
    }
}
