//! Message-level view of a managed link
//!
//! [`FrameCodec`] wraps a [`ConnectionManager`]. Lifecycle events are passed
//! through unchanged while the `connected`/`ready` mirrors are updated in the
//! same step, so a caller reading the flags after observing an event never
//! sees stale values. Raw chunks are reassembled and surface as
//! [`FrameEvent::MessageReceived`] only once a frame is complete.

use smallvec::SmallVec;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::{encode_frame, Reassembler};
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::errors::{ErrorKind, Result};
use crate::link::{Link, LinkMessage};
use crate::types::DeviceDescriptor;

// ----------------------------------------------------------------------------
// Frame Events
// ----------------------------------------------------------------------------

/// Events published to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    Connected,
    Disconnected,
    Ready,
    Error { kind: ErrorKind, description: String },
    /// A complete inbound message
    MessageReceived(Vec<u8>),
    ServiceUuidChanged(Uuid),
    CharacteristicUuidChanged(Uuid),
}

/// Batch of events collected from the codec
pub type FrameEvents = SmallVec<[FrameEvent; 4]>;

// ----------------------------------------------------------------------------
// Frame Codec
// ----------------------------------------------------------------------------

/// Length-prefixed messaging over a [`ConnectionManager`]
pub struct FrameCodec<L: Link> {
    manager: ConnectionManager<L>,
    reassembler: Reassembler,
    connected: bool,
    ready: bool,
    outbox: FrameEvents,
}

impl<L: Link> FrameCodec<L> {
    /// Wrap an idle connection manager
    pub fn new(manager: ConnectionManager<L>) -> Self {
        let mut codec = Self {
            manager,
            reassembler: Reassembler::new(),
            connected: false,
            ready: false,
            outbox: FrameEvents::new(),
        };
        codec.pump();
        codec
    }

    /// Configure target identifiers for the next connection
    pub fn configure(&mut self, service_uuid: Uuid, characteristic_uuid: Uuid) {
        self.manager.configure(service_uuid, characteristic_uuid);
        self.pump();
    }

    /// Set the target service identifier
    pub fn set_service_uuid(&mut self, uuid: Uuid) {
        self.manager.set_service_uuid(uuid);
        self.pump();
    }

    /// Set the target characteristic identifier
    pub fn set_characteristic_uuid(&mut self, uuid: Uuid) {
        self.manager.set_characteristic_uuid(uuid);
        self.pump();
    }

    /// Configured service identifier
    pub fn service_uuid(&self) -> Uuid {
        self.manager.service_uuid()
    }

    /// Configured characteristic identifier
    pub fn characteristic_uuid(&self) -> Uuid {
        self.manager.characteristic_uuid()
    }

    /// Connect to `device`, superseding any current link
    pub fn connect(&mut self, device: DeviceDescriptor) {
        self.manager.connect(device);
        self.pump();
    }

    /// Disconnect; no-op when idle
    pub fn disconnect(&mut self) {
        self.manager.disconnect();
        self.pump();
    }

    /// Frame `payload` and write it as a single operation
    ///
    /// Payloads over 255 bytes are rejected. While the link is not ready the
    /// frame is dropped without error.
    pub fn send_message(&mut self, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(payload)?;
        if !self.ready {
            warn!(len = payload.len(), "message dropped, link not ready");
            return Ok(());
        }

        self.manager.write(frame);
        self.pump();
        Ok(())
    }

    /// Feed a backend completion through the state machine
    pub fn dispatch(&mut self, message: LinkMessage) {
        self.manager.dispatch(message);
        self.pump();
    }

    /// Mirrored link flag, set on `Connected` and cleared on `Disconnected`
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Mirrored readiness flag, set on `Ready` and cleared on `Disconnected`
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// State of the wrapped manager
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Device of the current link while connected
    pub fn connected_device(&self) -> Option<&DeviceDescriptor> {
        self.manager.connected_device()
    }

    /// Wrapped connection manager
    pub fn manager(&self) -> &ConnectionManager<L> {
        &self.manager
    }

    /// Drain published events in order
    pub fn take_events(&mut self) -> FrameEvents {
        std::mem::take(&mut self.outbox)
    }

    fn pump(&mut self) {
        for event in self.manager.take_events() {
            match event {
                ConnectionEvent::Connected => {
                    self.connected = true;
                    self.outbox.push(FrameEvent::Connected);
                }
                ConnectionEvent::Ready => {
                    self.ready = true;
                    self.outbox.push(FrameEvent::Ready);
                }
                ConnectionEvent::Disconnected => {
                    self.connected = false;
                    self.ready = false;
                    if self.reassembler.is_in_progress() {
                        debug!(
                            buffered = self.reassembler.buffered().len(),
                            "discarding partial frame from closed link"
                        );
                    }
                    self.reassembler.reset();
                    self.outbox.push(FrameEvent::Disconnected);
                }
                ConnectionEvent::Error { kind, description } => {
                    self.outbox.push(FrameEvent::Error { kind, description });
                }
                ConnectionEvent::ChunkReceived(chunk) => {
                    if let Some(message) = self.reassembler.push(&chunk) {
                        debug!(len = message.len(), "message reassembled");
                        self.outbox.push(FrameEvent::MessageReceived(message));
                    }
                }
                ConnectionEvent::ServiceUuidChanged(uuid) => {
                    self.outbox.push(FrameEvent::ServiceUuidChanged(uuid));
                }
                ConnectionEvent::CharacteristicUuidChanged(uuid) => {
                    self.outbox
                        .push(FrameEvent::CharacteristicUuidChanged(uuid));
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkEvent;
    use crate::testing::{LinkRequest, MockLink};
    use crate::types::uuid_from_u16;

    const SERVICE: Uuid = uuid_from_u16(0x1234);
    const CHARACTERISTIC: Uuid = uuid_from_u16(0x5678);

    fn create_ready_codec() -> FrameCodec<MockLink> {
        let manager = ConnectionManager::with_targets(MockLink::new(), SERVICE, CHARACTERISTIC);
        let mut codec = FrameCodec::new(manager);
        bring_up(&mut codec);
        codec
    }

    fn bring_up(codec: &mut FrameCodec<MockLink>) {
        codec.connect(DeviceDescriptor::new("dev-a", "AA:BB:CC:DD:EE:01", "deviceA"));
        for event in [
            LinkEvent::LinkUp,
            LinkEvent::ServicesDiscovered {
                services: vec![SERVICE],
            },
            LinkEvent::DetailsDiscovered {
                characteristics: vec![CHARACTERISTIC],
            },
        ] {
            feed(codec, event);
        }
        codec.take_events();
    }

    fn feed(codec: &mut FrameCodec<MockLink>, event: LinkEvent) {
        let generation = codec.manager().generation();
        codec.dispatch(LinkMessage::new(generation, event));
    }

    fn chunk(value: &[u8]) -> LinkEvent {
        LinkEvent::CharacteristicChanged {
            characteristic: CHARACTERISTIC,
            value: value.to_vec(),
        }
    }

    #[test]
    fn test_flags_follow_events() {
        let manager = ConnectionManager::with_targets(MockLink::new(), SERVICE, CHARACTERISTIC);
        let mut codec = FrameCodec::new(manager);
        assert!(!codec.is_connected());

        codec.connect(DeviceDescriptor::new("dev-a", "AA", "deviceA"));
        feed(&mut codec, LinkEvent::LinkUp);
        assert!(codec.is_connected());
        assert!(!codec.is_ready());
        assert_eq!(codec.take_events().as_slice(), &[FrameEvent::Connected]);

        codec.disconnect();
        assert!(!codec.is_connected());
        assert_eq!(codec.take_events().as_slice(), &[FrameEvent::Disconnected]);
    }

    #[test]
    fn test_send_message_writes_one_frame() {
        let mut codec = create_ready_codec();
        codec.send_message(b"hi").unwrap();

        let writes: Vec<_> = codec
            .manager()
            .link()
            .requests()
            .into_iter()
            .filter_map(|request| match request {
                LinkRequest::Write {
                    characteristic,
                    data,
                    ..
                } => Some((characteristic, data)),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![(CHARACTERISTIC, vec![0x02, b'h', b'i'])]);
    }

    #[test]
    fn test_oversized_message_rejected_even_when_ready() {
        let mut codec = create_ready_codec();
        assert!(codec.send_message(&[0u8; 256]).is_err());
        assert!(codec
            .manager()
            .link()
            .requests()
            .iter()
            .all(|request| !matches!(request, LinkRequest::Write { .. })));
    }

    #[test]
    fn test_send_while_not_ready_is_silent() {
        let manager = ConnectionManager::with_targets(MockLink::new(), SERVICE, CHARACTERISTIC);
        let mut codec = FrameCodec::new(manager);
        assert!(codec.send_message(b"hi").is_ok());
        assert!(codec.manager().link().requests().is_empty());
    }

    #[test]
    fn test_message_emitted_after_last_chunk() {
        let mut codec = create_ready_codec();
        feed(&mut codec, chunk(&[0x02]));
        feed(&mut codec, chunk(b"h"));
        assert!(codec.take_events().is_empty());
        feed(&mut codec, chunk(b"i"));
        assert_eq!(
            codec.take_events().as_slice(),
            &[FrameEvent::MessageReceived(b"hi".to_vec())]
        );
    }

    #[test]
    fn test_partial_frame_discarded_on_disconnect() {
        let mut codec = create_ready_codec();
        feed(&mut codec, chunk(&[0x04, b'a', b'b']));
        codec.disconnect();
        assert_eq!(codec.take_events().as_slice(), &[FrameEvent::Disconnected]);

        bring_up(&mut codec);
        assert!(codec.is_ready());
        feed(&mut codec, chunk(&[0x01, b'z']));
        assert_eq!(
            codec.take_events().as_slice(),
            &[FrameEvent::MessageReceived(b"z".to_vec())]
        );
    }
}
