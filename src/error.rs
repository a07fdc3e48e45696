use thiserror::Error;

/// Main error type for the trading bot
#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Exchange transport errors (REST call failed, timed out, etc.)
    #[error("Exchange error: {0}")]
    Exchange(String),

    // Order lifecycle errors
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BotError {
    /// Whether the next tick may legitimately retry the failed operation.
    /// Everything coming back from the exchange transport counts; the engine
    /// logs these and keeps polling.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BotError::Exchange(_) | BotError::MarketDataUnavailable(_)
        )
    }
}

/// Result type alias for BotError
pub type Result<T> = std::result::Result<T, BotError>;
