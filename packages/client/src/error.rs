//! Client error definitions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The channel did not open within the wait bound
    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("no active connection to {0}")]
    NotConnected(String),

    #[error("the session has been shut down")]
    Closed,

    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
