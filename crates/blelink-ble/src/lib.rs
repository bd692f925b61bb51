//! Bluetooth Low Energy backend for blelink
//!
//! This crate plugs btleplug into `blelink-core`: [`BtleplugLink`] implements
//! the core `Link` trait in the central role, and [`BleScanner`] implements
//! `DeviceScanner`.
//!
//! ## Architecture
//!
//! - [`config`] - Scan window, adapter choice and write mode
//! - [`error`] - Error types specific to the backend
//! - [`adapter`] - Adapter selection and peripheral lookup
//! - [`scanner`] - Bounded-time device scanning
//! - [`link`] - Per-generation session workers driving one peripheral
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blelink_ble::{select_adapter, BleConfig, BleScanner, BtleplugLink};
//! use blelink_core::{spawn_link, DeviceScanner, LinkConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ble_config = BleConfig::new();
//! let adapter = select_adapter(ble_config.adapter_index).await?;
//!
//! let mut scanner = BleScanner::with_adapter(adapter.clone(), ble_config.clone());
//! let devices = scanner.scan().await?;
//!
//! let link_config = LinkConfig::new()
//!     .with_service_uuid("1234")
//!     .with_characteristic_uuid("5678");
//! let (handle, _events, _task) = spawn_link(&link_config, |sender| {
//!     BtleplugLink::new(adapter, ble_config, sender)
//! })?;
//! if let Some(device) = devices.into_iter().next() {
//!     handle.connect(device).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
mod config;
mod error;
mod link;
mod scanner;

pub use adapter::{describe, find_peripheral, select_adapter};
pub use config::BleConfig;
pub use error::{BleLinkError, Result};
pub use link::BtleplugLink;
pub use scanner::BleScanner;
