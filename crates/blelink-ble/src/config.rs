//! btleplug backend configuration

use std::time::Duration;

use btleplug::api::WriteType;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the btleplug backend
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// How long one scan listens for advertisements, in milliseconds
    pub scan_timeout_ms: u64,
    /// Index of the adapter to use in the platform's adapter list
    pub adapter_index: usize,
    /// Use acknowledged writes instead of write-without-response
    pub write_with_response: bool,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 5000,
            adapter_index: 0,
            write_with_response: false,
        }
    }
}

impl BleConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Select the adapter by index
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Enable or disable acknowledged writes
    pub fn with_write_with_response(mut self, enabled: bool) -> Self {
        self.write_with_response = enabled;
        self
    }

    /// Scan duration
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Write mode for characteristic writes
    pub fn write_type(&self) -> WriteType {
        if self.write_with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        }
    }
}
