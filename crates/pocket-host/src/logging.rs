use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`info`, `pocket_core=debug`, ...).
pub const LOG_ENV: &str = "POCKET_LOG";

static INIT: Once = Once::new();

/// Install a fmt subscriber filtered by `POCKET_LOG` (default `info`).
///
/// Safe to call repeatedly; if the process already has a global subscriber
/// that one stays in place.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_logging();
        init_logging();
        tracing::info!("logging initialised twice");
    }
}
