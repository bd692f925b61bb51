//! Adapter selection and peripheral lookup

use blelink_core::DeviceDescriptor;
use btleplug::api::{Central, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tracing::{debug, info};

use crate::error::{BleLinkError, Result};

/// Open the platform manager and pick the adapter at `index`
pub async fn select_adapter(index: usize) -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    if adapters.is_empty() {
        return Err(BleLinkError::AdapterNotAvailable);
    }

    let available = adapters.len();
    let adapter = adapters
        .into_iter()
        .nth(index)
        .ok_or(BleLinkError::AdapterNotFound { index, available })?;

    match adapter.adapter_info().await {
        Ok(info) => info!(index, adapter = %info, "BLE adapter selected"),
        Err(_) => info!(index, "BLE adapter selected"),
    }
    Ok(adapter)
}

/// Stable identifier string for a peripheral
pub fn peripheral_key(peripheral: &Peripheral) -> String {
    format!("{:?}", peripheral.id())
}

/// Describe a peripheral the way the core expects
pub async fn describe(peripheral: &Peripheral) -> Result<DeviceDescriptor> {
    let properties = peripheral.properties().await?;
    let (name, address) = match properties {
        Some(properties) => (
            properties.local_name.unwrap_or_default(),
            properties.address.to_string(),
        ),
        None => (String::new(), peripheral.address().to_string()),
    };
    Ok(DeviceDescriptor::new(peripheral_key(peripheral), address, name))
}

/// Find the peripheral a descriptor was built from
///
/// Matches on the identifier first and falls back to the address, which is
/// what survives between processes.
pub async fn find_peripheral(adapter: &Adapter, device: &DeviceDescriptor) -> Result<Peripheral> {
    let peripherals = adapter.peripherals().await?;
    debug!(
        known = peripherals.len(),
        device = %device,
        "looking up peripheral"
    );

    if let Some(peripheral) = peripherals
        .iter()
        .find(|peripheral| peripheral_key(peripheral) == device.id)
    {
        return Ok(peripheral.clone());
    }

    peripherals
        .into_iter()
        .find(|peripheral| {
            peripheral
                .address()
                .to_string()
                .eq_ignore_ascii_case(&device.address)
        })
        .ok_or_else(|| BleLinkError::DeviceNotFound(device.to_string()))
}
