//! Logging initialization for bqflow.
//!
//! Logging is set up once per process by whatever bootstrap owns a
//! `LoggingState`. Repeated initialization is a no-op that reports a
//! warning instead of failing silently.

use tracing_subscriber::EnvFilter;

/// Tracks whether logging has been initialized for this bootstrap.
///
/// The state is an explicit object rather than a process-global flag so
/// tests and embedding processes can own their own initialization lifecycle.
#[derive(Debug, Default)]
pub struct LoggingState {
    initialized: bool,
}

impl LoggingState {
    /// Creates a new, uninitialized logging state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `init` has already run on this state.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Installs a stderr `tracing` subscriber with an env-filter.
    ///
    /// The filter is taken from `RUST_LOG` when set, defaulting to `info`.
    /// Calling this twice, or calling it when another subscriber is already
    /// installed, warns and leaves the existing subscriber in place.
    pub fn init(&mut self) {
        if self.initialized {
            tracing::warn!("logging already initialized, ignoring repeated init");
            return;
        }

        let result = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init();

        if let Err(e) = result {
            // A subscriber from another component is already installed.
            tracing::warn!("logging subscriber already installed elsewhere: {e}");
        }

        self.initialized = true;
    }
}
