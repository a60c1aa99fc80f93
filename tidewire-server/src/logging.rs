//! Logging utilities for the protocol engine
//!
//! The `log_*` macros forward to `tracing`; [`init_logging`] installs a
//! formatting subscriber filtered by `RUST_LOG` when the `logging` feature is on.

#[doc(hidden)]
pub use tracing;

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::tracing::error!($($arg)*)
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::tracing::warn!($($arg)*)
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::tracing::info!($($arg)*)
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::tracing::debug!($($arg)*)
    };
}

/// Log a trace message
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::tracing::trace!($($arg)*)
    };
}

/// Initialize logging subsystem
///
/// Fails if a global subscriber is already installed.
#[cfg(feature = "logging")]
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Initialize logging subsystem (no-op when logging feature is disabled)
#[cfg(not(feature = "logging"))]
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_macros() {
        log_info!("Test info message");
        log_warn!(session = 7, "Test warning message");
        log_error!("Test error message: {}", 42);
        log_debug!("Test debug message");
        log_trace!("Test trace message");
    }

    #[test]
    fn test_init_logging_twice() {
        let first = init_logging();
        let second = init_logging();
        // Only one global subscriber can win; the other call reports it
        assert!(first.is_ok() || second.is_err());
    }
}
