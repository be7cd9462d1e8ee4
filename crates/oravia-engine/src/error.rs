//! Error types for the engine binary.

/// Top-level error for the engine binary.
///
/// Each variant wraps a subsystem error so that `main` can propagate any
/// startup failure with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: oravia_core::ConfigError,
    },

    /// Connecting to the store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: oravia_store::StoreError,
    },
}
