//! Error types for fasterspeech.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    /// Invalid configuration (unknown scheme, loss method, reduction, sampler).
    #[error("config: {0}")]
    Config(String),

    /// Shape invariant violation. Signals a data or logic defect upstream,
    /// never a transient condition — the batch/step must be aborted.
    #[error("shape: {0}")]
    Shape(String),

    /// Missing key in a side table (durations, speakers).
    #[error("lookup: {0}")]
    Lookup(String),

    /// I/O error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
