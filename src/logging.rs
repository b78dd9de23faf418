//! Subscriber setup for shells embedding this crate. The library itself only
//! emits `tracing` events.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,clipfetch=debug";

/// `RUST_LOG` if set and valid, otherwise [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr fmt subscriber. Errors (instead of panicking) when a
/// global subscriber is already set.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()?;

    tracing::debug!("clipfetch logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let _ = init_logging();
        assert!(init_logging().is_err());
    }
}
