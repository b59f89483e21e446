//! Tracing setup for the harness binaries.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::HarnessConfig;

/// Install a stderr subscriber filtered by `RUST_LOG`, falling back to the
/// configured filter. Returns false if a subscriber was already installed.
pub fn init(config: &HarnessConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = HarnessConfig::default();
        init(&config);
        assert!(!init(&config));
    }
}
