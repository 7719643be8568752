use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured filter. Calling this more than once
/// keeps the first subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Default filter: debug logs for this crate in debug builds, info otherwise
pub fn default_filter() -> String {
    if cfg!(debug_assertions) {
        "mailbox=debug,info".into()
    } else {
        "info".into()
    }
}

pub fn fmt_ms(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 { "<1ms".into() } else { format!("{}ms", ms) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_ms() {
        assert_eq!(fmt_ms(Duration::from_micros(300)), "<1ms");
        assert_eq!(fmt_ms(Duration::from_millis(42)), "42ms");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        init_tracing(&config);
        init_tracing(&config);
    }
}
