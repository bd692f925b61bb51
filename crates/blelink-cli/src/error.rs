//! Error handling for the blelink CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("blelink core error: {0}")]
    Core(#[from] blelink_core::BlelinkError),

    #[error("BLE error: {0}")]
    Ble(#[from] blelink_ble::BleLinkError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Device selection error: {0}")]
    DeviceSelection(String),

    #[error("Device error #{code}: {description}")]
    Device { code: u8, description: String },

    #[error("Link dropped before it became ready")]
    LinkDropped,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hex decoding error: {0}")]
    HexDecoding(#[from] hex::FromHexError),

    #[error("{0}")]
    Other(String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<(blelink_core::ErrorKind, String)> for CliError {
    fn from((kind, description): (blelink_core::ErrorKind, String)) -> Self {
        CliError::Device {
            code: kind.code(),
            description,
        }
    }
}
