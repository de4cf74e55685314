// src/error.rs
//! Error types for the GPS session

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GpsError>;

#[derive(Debug, Error)]
pub enum GpsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The device path could not be resolved or the port is not open.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("GPS session is not initialized")]
    NotInitialized,

    #[error("No callbacks registered")]
    NoCallbacks,

    /// Another command is still waiting for its acknowledgement.
    #[error("Command port busy")]
    Busy,

    #[error("No acknowledgement for command {0}")]
    AckTimeout(&'static str),
}
