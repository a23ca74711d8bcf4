//! Error types for market data operations.
//!
//! Provider adapters convert transport and payload failures into this
//! enum; the engine layers map it into their own root error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Ticker '{0}' is not supported")]
    UnknownTicker(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation '{operation}' is not supported by provider '{provider}'")]
    NotSupported { operation: String, provider: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketDataError::WebSocket(error.to_string())
    }
}
