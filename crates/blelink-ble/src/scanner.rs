//! Bounded-time device scanning

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use blelink_core::{DeviceDescriptor, DeviceScanner};
use btleplug::api::{Central, ScanFilter};
use btleplug::platform::Adapter;
use tracing::{debug, info, warn};

use crate::adapter::{describe, select_adapter};
use crate::config::BleConfig;
use crate::error::{BleLinkError, Result};

// ----------------------------------------------------------------------------
// Scanner
// ----------------------------------------------------------------------------

/// Scans for advertising peripherals for a fixed window
pub struct BleScanner {
    adapter: Adapter,
    config: BleConfig,
    devices: Vec<DeviceDescriptor>,
    busy: AtomicBool,
}

/// Clears the busy flag even if the scan future is dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Result<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(BleLinkError::ScanInProgress);
        }
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BleScanner {
    /// Create a scanner on the adapter selected by `config`
    pub async fn new(config: BleConfig) -> Result<Self> {
        let adapter = select_adapter(config.adapter_index).await?;
        Ok(Self::with_adapter(adapter, config))
    }

    /// Create a scanner on an already opened adapter
    pub fn with_adapter(adapter: Adapter, config: BleConfig) -> Self {
        Self {
            adapter,
            config,
            devices: Vec::new(),
            busy: AtomicBool::new(false),
        }
    }

    /// Adapter used for scanning
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Run one scan window and replace the device list
    pub async fn scan_devices(&mut self) -> Result<Vec<DeviceDescriptor>> {
        let devices = {
            let _guard = BusyGuard::enter(&self.busy)?;
            self.collect().await?
        };
        self.devices = devices.clone();
        Ok(devices)
    }

    async fn collect(&self) -> Result<Vec<DeviceDescriptor>> {
        let timeout = self.config.scan_timeout();
        info!(timeout_ms = timeout.as_millis() as u64, "starting BLE scan");

        self.adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(timeout).await;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop BLE scan: {}", e);
        }

        let mut devices = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            match describe(&peripheral).await {
                Ok(device) => {
                    debug!(device = %device, "discovered");
                    devices.push(device);
                }
                Err(e) => debug!("Skipping peripheral without properties: {}", e),
            }
        }

        info!(found = devices.len(), "BLE scan finished");
        Ok(devices)
    }
}

#[async_trait]
impl DeviceScanner for BleScanner {
    async fn scan(&mut self) -> blelink_core::Result<Vec<DeviceDescriptor>> {
        self.scan_devices().await.map_err(Into::into)
    }

    fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_guard_rejects_overlap() {
        let flag = AtomicBool::new(false);
        let guard = BusyGuard::enter(&flag).unwrap();
        assert!(flag.load(Ordering::Acquire));
        assert!(matches!(
            BusyGuard::enter(&flag),
            Err(BleLinkError::ScanInProgress)
        ));

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(BusyGuard::enter(&flag).is_ok());
    }
}
