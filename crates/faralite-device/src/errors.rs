//! Device client errors.

/// Errors raised by the device client.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Manual card numbers must be non-empty digits.
    #[error("card number must contain only digits: {0:?}")]
    InvalidCard(String),

    /// The configured URL or headers could not form a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Handshake or transport failure.
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
