//! Seams between the core and platform BLE stacks
//!
//! A [`Link`] backend receives non-blocking requests from the connection
//! manager and reports every completion later as a [`LinkMessage`] on the
//! channel it was built with. Each request carries the [`Generation`] it was
//! issued under, and each completion must echo it back unchanged.
//!
//! A [`DeviceScanner`] enumerates peripherals; the core only consumes the
//! [`DeviceDescriptor`]s it produces.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::Result;
use crate::types::{DeviceDescriptor, Generation};

// ----------------------------------------------------------------------------
// Link Completions
// ----------------------------------------------------------------------------

/// Completion or unsolicited event reported by a link backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Central-role connection established
    LinkUp,
    /// Connection establishment or transport failure
    LinkFailed { description: String },
    /// Service discovery finished with these primary services
    ServicesDiscovered { services: Vec<Uuid> },
    /// Detail discovery of the requested service finished
    DetailsDiscovered { characteristics: Vec<Uuid> },
    /// Service-level failure (detail discovery, subscription, write)
    ServiceFailed { description: String },
    /// Notification chunk from a characteristic
    CharacteristicChanged { characteristic: Uuid, value: Vec<u8> },
    /// Peripheral dropped the link
    LinkLost,
    /// Unclassified failure from the underlying stack
    StackFailure { description: String },
}

/// A link event tagged with the generation of the request that caused it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub generation: Generation,
    pub event: LinkEvent,
}

impl LinkMessage {
    /// Tag an event with a generation
    pub fn new(generation: Generation, event: LinkEvent) -> Self {
        Self { generation, event }
    }
}

/// Channel on which backends report completions
pub type LinkSender = mpsc::UnboundedSender<LinkMessage>;

/// Receiving end of [`LinkSender`]
pub type LinkReceiver = mpsc::UnboundedReceiver<LinkMessage>;

/// Create a completion channel for a link backend
pub fn link_channel() -> (LinkSender, LinkReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Link Backend
// ----------------------------------------------------------------------------

/// Non-blocking central-role link to a single peripheral
///
/// None of these calls may wait for the radio. Results arrive later as
/// [`LinkMessage`]s tagged with the generation passed in.
pub trait Link: Send {
    /// Start connecting to `device`
    fn connect(&mut self, generation: Generation, device: &DeviceDescriptor);

    /// Start primary service discovery on the connected peripheral
    fn discover_services(&mut self, generation: Generation);

    /// Start discovering characteristics of `service`, enabling notifications
    /// on `characteristic` when the service has it
    fn discover_details(&mut self, generation: Generation, service: Uuid, characteristic: Uuid);

    /// Write `data` to `characteristic` as a single operation
    fn write(&mut self, generation: Generation, characteristic: Uuid, data: Vec<u8>);

    /// Tear down the link established under `generation`
    fn disconnect(&mut self, generation: Generation);
}

// ----------------------------------------------------------------------------
// Device Scanner
// ----------------------------------------------------------------------------

/// Bounded-time peripheral enumeration
#[async_trait]
pub trait DeviceScanner: Send {
    /// Run one scan, replacing the previous device list
    async fn scan(&mut self) -> Result<Vec<DeviceDescriptor>>;

    /// Devices found by the last completed scan
    fn devices(&self) -> &[DeviceDescriptor];

    /// Whether a scan is currently running
    fn is_busy(&self) -> bool;

    /// Look up a device from the last scan by advertised name
    fn device_by_name(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.devices().iter().find(|device| device.name == name)
    }

    /// Look up a device from the last scan by address (case-insensitive)
    fn device_by_address(&self, address: &str) -> Option<&DeviceDescriptor> {
        self.devices()
            .iter()
            .find(|device| device.address.eq_ignore_ascii_case(address))
    }
}
