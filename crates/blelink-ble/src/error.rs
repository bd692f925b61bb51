//! Error types for the btleplug backend

use blelink_core::BlelinkError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the btleplug backend
#[derive(Error, Debug)]
pub enum BleLinkError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("BLE adapter #{index} not found ({available} available)")]
    AdapterNotFound { index: usize, available: usize },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Scan already in progress")]
    ScanInProgress,

    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("Failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(String),

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Failed to write to characteristic: {0}")]
    WriteFailed(String),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("BLE stack error: {0}")]
    Btleplug(#[from] btleplug::Error),
}

impl From<BleLinkError> for BlelinkError {
    fn from(err: BleLinkError) -> Self {
        match err {
            BleLinkError::ScanInProgress | BleLinkError::DeviceNotFound(_) => {
                BlelinkError::ScanFailed(err.to_string())
            }
            other => BlelinkError::Backend(other.to_string()),
        }
    }
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BleLinkError>;
