//! blelink application: scanner, link task and event presentation

use blelink_ble::{select_adapter, BleScanner, BtleplugLink};
use blelink_core::{
    spawn_link, DeviceDescriptor, DeviceScanner, FrameEvent, FrameEventReceiver, LinkHandle,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Device Selection
// ----------------------------------------------------------------------------

/// How the user named the device to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Position in the scan list
    Index(usize),
    /// Hardware address, `AA:BB:CC:DD:EE:FF`
    Address(String),
    /// Advertised name
    Name(String),
}

impl DeviceSelector {
    /// Interpret a command line device argument
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let Ok(index) = value.parse::<usize>() {
            return DeviceSelector::Index(index);
        }
        if is_address(value) {
            return DeviceSelector::Address(value.to_string());
        }
        DeviceSelector::Name(value.to_string())
    }

    /// Pick the matching device from a scan result
    pub fn select(&self, devices: &[DeviceDescriptor]) -> Result<DeviceDescriptor> {
        let found = match self {
            DeviceSelector::Index(index) => {
                return devices.get(*index).cloned().ok_or_else(|| {
                    CliError::DeviceSelection(format!(
                        "Device index {} out of range ({} devices found)",
                        index,
                        devices.len()
                    ))
                })
            }
            DeviceSelector::Address(address) => devices
                .iter()
                .find(|device| device.address.eq_ignore_ascii_case(address)),
            DeviceSelector::Name(name) => devices.iter().find(|device| device.name == *name),
        };

        found.cloned().ok_or_else(|| {
            CliError::DeviceSelection(format!("No device matching {} found", self))
        })
    }
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSelector::Index(index) => write!(f, "#{}", index),
            DeviceSelector::Address(address) => write!(f, "address {}", address),
            DeviceSelector::Name(name) => write!(f, "name '{}'", name),
        }
    }
}

fn is_address(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

// ----------------------------------------------------------------------------
// Event Presentation
// ----------------------------------------------------------------------------

/// Render a received payload as text, or hex when asked or not UTF-8
pub fn render_payload(bytes: &[u8], show_hex: bool) -> String {
    if show_hex {
        return hex::encode(bytes);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(bytes)),
    }
}

/// One-line description of a link event for the terminal
pub fn format_event(event: &FrameEvent, show_hex: bool) -> String {
    match event {
        FrameEvent::Connected => "Connected".to_string(),
        FrameEvent::Ready => "Ready".to_string(),
        FrameEvent::Disconnected => "Disconnected".to_string(),
        FrameEvent::Error { kind, description } => {
            format!("Device error #{}: {}", kind.code(), description)
        }
        FrameEvent::MessageReceived(bytes) => format!("< {}", render_payload(bytes, show_hex)),
        FrameEvent::ServiceUuidChanged(uuid) => format!("Service UUID set to {}", uuid),
        FrameEvent::CharacteristicUuidChanged(uuid) => {
            format!("Characteristic UUID set to {}", uuid)
        }
    }
}

/// Line printed for each scanned device
pub fn format_device(index: usize, device: &DeviceDescriptor) -> String {
    format!("{:>3}  {}", index, device)
}

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

/// Scanner plus a running link task on one adapter
pub struct LinkApp {
    config: AppConfig,
    scanner: BleScanner,
    handle: LinkHandle,
    events: FrameEventReceiver,
    task: JoinHandle<blelink_core::Result<()>>,
}

impl LinkApp {
    /// Open the configured adapter and start the link task
    pub async fn new(config: AppConfig) -> Result<Self> {
        let adapter = select_adapter(config.ble.adapter_index).await?;
        let scanner = BleScanner::with_adapter(adapter.clone(), config.ble.clone());

        let ble_config = config.ble.clone();
        let (handle, events, task) = spawn_link(&config.link, move |sender| {
            BtleplugLink::new(adapter, ble_config, sender)
        })?;

        Ok(Self {
            config,
            scanner,
            handle,
            events,
            task,
        })
    }

    /// Application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle to the link task
    pub fn handle(&self) -> &LinkHandle {
        &self.handle
    }

    /// Run one scan and return the devices found
    pub async fn scan(&mut self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.scanner.scan().await?)
    }

    /// Scan, pick the selected device and start connecting to it
    ///
    /// Refused before any radio activity when the target identifiers are not
    /// configured.
    pub async fn connect(&mut self, selector: &DeviceSelector) -> Result<DeviceDescriptor> {
        self.config.link.require_targets()?;

        let devices = self.scan().await?;
        let device = selector.select(&devices)?;
        info!(device = %device, "connecting");
        self.handle.connect(device.clone()).await?;
        Ok(device)
    }

    /// Wait for `Ready`, failing on the first error or disconnect
    pub async fn await_ready(&mut self) -> Result<()> {
        let timeout = self.config.cli.ready_timeout();
        let wait = async {
            loop {
                match self.events.recv().await {
                    Some(FrameEvent::Ready) => return Ok(()),
                    Some(FrameEvent::Error { kind, description }) => {
                        return Err(CliError::from((kind, description)))
                    }
                    Some(FrameEvent::Disconnected) => return Err(CliError::LinkDropped),
                    Some(event) => debug!(?event, "waiting for ready"),
                    None => return Err(blelink_core::BlelinkError::TaskClosed.into()),
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            CliError::Timeout(format!(
                "link not ready after {}s",
                timeout.as_secs()
            ))
        })?
    }

    /// Send one message over the ready link
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        if !self.handle.is_ready() {
            warn!("link not ready, message will be dropped");
        }
        self.handle.send_message(payload).await?;
        Ok(())
    }

    /// Next published link event
    pub async fn next_event(&mut self) -> Option<FrameEvent> {
        self.events.recv().await
    }

    /// Disconnect, stop the link task and wait for it
    pub async fn shutdown(self) -> Result<()> {
        if self.handle.shutdown().await.is_err() {
            debug!("link task already stopped");
        }
        match self.task.await {
            Ok(result) => result.map_err(CliError::from),
            Err(e) => Err(CliError::Other(format!("link task failed: {}", e))),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use blelink_core::ErrorKind;

    fn create_devices() -> Vec<DeviceDescriptor> {
        vec![
            DeviceDescriptor::new("id-a", "AA:BB:CC:DD:EE:01", "deviceA"),
            DeviceDescriptor::new("id-b", "AA:BB:CC:DD:EE:02", "deviceB"),
        ]
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(DeviceSelector::parse("1"), DeviceSelector::Index(1));
        assert_eq!(
            DeviceSelector::parse("aa:bb:cc:dd:ee:02"),
            DeviceSelector::Address("aa:bb:cc:dd:ee:02".to_string())
        );
        assert_eq!(
            DeviceSelector::parse("deviceA"),
            DeviceSelector::Name("deviceA".to_string())
        );
    }

    #[test]
    fn test_select_by_each_selector() {
        let devices = create_devices();
        assert_eq!(
            DeviceSelector::Index(1).select(&devices).unwrap().name,
            "deviceB"
        );
        assert_eq!(
            DeviceSelector::parse("aa:bb:cc:dd:ee:01")
                .select(&devices)
                .unwrap()
                .name,
            "deviceA"
        );
        assert_eq!(
            DeviceSelector::parse("deviceB").select(&devices).unwrap().id,
            "id-b"
        );
    }

    #[test]
    fn test_index_out_of_range_refused() {
        let err = DeviceSelector::Index(2)
            .select(&create_devices())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Device selection error: Device index 2 out of range (2 devices found)"
        );
    }

    #[test]
    fn test_format_events() {
        assert_eq!(format_event(&FrameEvent::Ready, false), "Ready");
        assert_eq!(
            format_event(
                &FrameEvent::Error {
                    kind: ErrorKind::LinkError,
                    description: "Connection error: timeout".to_string(),
                },
                false
            ),
            "Device error #1: Connection error: timeout"
        );
        assert_eq!(
            format_event(&FrameEvent::MessageReceived(b"hi".to_vec()), false),
            "< hi"
        );
        assert_eq!(
            format_event(&FrameEvent::MessageReceived(b"hi".to_vec()), true),
            "< 6869"
        );
    }

    #[test]
    fn test_non_utf8_payload_rendered_as_hex() {
        assert_eq!(render_payload(&[0xff, 0x00], false), "0xff00");
    }

    #[test]
    fn test_device_line() {
        let devices = create_devices();
        assert_eq!(
            format_device(0, &devices[0]),
            "  0  deviceA (AA:BB:CC:DD:EE:01)"
        );
    }
}
