//! Connection lifecycle state machine
//!
//! [`ConnectionManager`] owns the single link to a peripheral and drives the
//! handshake:
//!
//! ```text
//! Idle -> Connecting -> LinkUp -> DiscoveringServices -> ServiceResolved
//!      -> DiscoveringCharacteristic -> Ready
//! ```
//!
//! Any state falls back to `Idle` on `disconnect` or on an error. Requests go
//! out through a [`Link`] backend; completions come back through
//! [`ConnectionManager::dispatch`], the only place the state advances from
//! link activity. Every connect attempt and every teardown moves the
//! generation forward, so completions issued for a superseded attempt are
//! dropped on arrival.
//!
//! Lifecycle events are queued in an outbox and collected with
//! [`ConnectionManager::take_events`].

use core::fmt;

use smallvec::SmallVec;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::link::{Link, LinkEvent, LinkMessage};
use crate::types::{DeviceDescriptor, Generation};

// ----------------------------------------------------------------------------
// Connection State Types
// ----------------------------------------------------------------------------

/// Lifecycle state of the managed link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No link; initial and post-teardown state
    Idle,
    /// Link requested, waiting for the backend
    Connecting,
    /// Link established
    LinkUp,
    /// Waiting for primary service discovery
    DiscoveringServices,
    /// Configured service found on the peripheral
    ServiceResolved,
    /// Waiting for the service's characteristics
    DiscoveringCharacteristic,
    /// Characteristic resolved; writes and notifications flow
    Ready,
}

impl ConnectionState {
    /// State name for logging
    pub fn state_name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::LinkUp => "LinkUp",
            ConnectionState::DiscoveringServices => "DiscoveringServices",
            ConnectionState::ServiceResolved => "ServiceResolved",
            ConnectionState::DiscoveringCharacteristic => "DiscoveringCharacteristic",
            ConnectionState::Ready => "Ready",
        }
    }

    /// Whether a link exists, regardless of discovery progress
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::LinkUp
                | ConnectionState::DiscoveringServices
                | ConnectionState::ServiceResolved
                | ConnectionState::DiscoveringCharacteristic
                | ConnectionState::Ready
        )
    }

    /// Whether the characteristic is resolved
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

// ----------------------------------------------------------------------------
// Lifecycle Events
// ----------------------------------------------------------------------------

/// Events emitted by the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Link established
    Connected,
    /// Left a non-idle state for `Idle`
    Disconnected,
    /// Target characteristic resolved
    Ready,
    /// Asynchronous failure; a teardown follows immediately
    Error { kind: ErrorKind, description: String },
    /// Raw notification chunk from the resolved characteristic
    ChunkReceived(Vec<u8>),
    /// Configured service identifier changed
    ServiceUuidChanged(Uuid),
    /// Configured characteristic identifier changed
    CharacteristicUuidChanged(Uuid),
}

/// Batch of events collected from the outbox
pub type ConnectionEvents = SmallVec<[ConnectionEvent; 4]>;

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

/// Live link plus its discovered context
///
/// Targets are captured at `connect`; reconfiguring only affects the next
/// attempt.
#[derive(Debug, Clone)]
struct ActiveLink {
    device: DeviceDescriptor,
    target_service: Uuid,
    target_characteristic: Uuid,
    service: Option<Uuid>,
    characteristic: Option<Uuid>,
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Single-peripheral connection state machine
pub struct ConnectionManager<L: Link> {
    link: L,
    state: ConnectionState,
    generation: Generation,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
    active: Option<ActiveLink>,
    outbox: ConnectionEvents,
}

impl<L: Link> ConnectionManager<L> {
    /// Create an idle manager with nil target identifiers
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: ConnectionState::Idle,
            generation: Generation::default(),
            service_uuid: Uuid::nil(),
            characteristic_uuid: Uuid::nil(),
            active: None,
            outbox: ConnectionEvents::new(),
        }
    }

    /// Create an idle manager with target identifiers already set
    pub fn with_targets(link: L, service_uuid: Uuid, characteristic_uuid: Uuid) -> Self {
        let mut manager = Self::new(link);
        manager.service_uuid = service_uuid;
        manager.characteristic_uuid = characteristic_uuid;
        manager
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    /// Set both target identifiers; applies from the next `connect`
    pub fn configure(&mut self, service_uuid: Uuid, characteristic_uuid: Uuid) {
        self.set_service_uuid(service_uuid);
        self.set_characteristic_uuid(characteristic_uuid);
    }

    /// Set the target service identifier
    pub fn set_service_uuid(&mut self, uuid: Uuid) {
        if self.service_uuid != uuid {
            self.service_uuid = uuid;
            self.outbox.push(ConnectionEvent::ServiceUuidChanged(uuid));
        }
    }

    /// Set the target characteristic identifier
    pub fn set_characteristic_uuid(&mut self, uuid: Uuid) {
        if self.characteristic_uuid != uuid {
            self.characteristic_uuid = uuid;
            self.outbox
                .push(ConnectionEvent::CharacteristicUuidChanged(uuid));
        }
    }

    /// Configured service identifier
    pub fn service_uuid(&self) -> Uuid {
        self.service_uuid
    }

    /// Configured characteristic identifier
    pub fn characteristic_uuid(&self) -> Uuid {
        self.characteristic_uuid
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Start a new connection attempt, tearing down any existing one first
    pub fn connect(&mut self, device: DeviceDescriptor) {
        if self.state != ConnectionState::Idle {
            info!(
                state = %self.state,
                "connect requested while active, disconnecting first"
            );
            self.disconnect();
        }

        self.generation = self.generation.next();
        info!(
            generation = %self.generation,
            device = %device,
            service = %self.service_uuid,
            characteristic = %self.characteristic_uuid,
            "connecting"
        );

        self.link.connect(self.generation, &device);
        self.active = Some(ActiveLink {
            device,
            target_service: self.service_uuid,
            target_characteristic: self.characteristic_uuid,
            service: None,
            characteristic: None,
        });
        self.transition_to(ConnectionState::Connecting);
    }

    /// Tear down the link and return to `Idle`; no-op when already idle
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Idle {
            debug!("disconnect requested while idle");
            return;
        }

        let torn_down = self.generation;
        self.generation = self.generation.next();
        self.active = None;
        self.link.disconnect(torn_down);
        self.transition_to(ConnectionState::Idle);
        info!(generation = %torn_down, "disconnected");
        self.outbox.push(ConnectionEvent::Disconnected);
    }

    /// Write raw bytes to the resolved characteristic; dropped unless ready
    pub fn write(&mut self, data: Vec<u8>) {
        let characteristic = match (&self.state, &self.active) {
            (ConnectionState::Ready, Some(ActiveLink { characteristic: Some(c), .. })) => *c,
            _ => {
                warn!(
                    state = %self.state,
                    len = data.len(),
                    "write dropped, link not ready"
                );
                return;
            }
        };

        debug!(len = data.len(), "writing to characteristic");
        self.link.write(self.generation, characteristic, data);
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Generation of the current (or last torn down) attempt
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether a link exists
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Whether writes and notifications flow
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Device of the current link while connected
    pub fn connected_device(&self) -> Option<&DeviceDescriptor> {
        if !self.is_connected() {
            return None;
        }
        self.active.as_ref().map(|active| &active.device)
    }

    /// Backend reference
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Drain queued lifecycle events in emission order
    pub fn take_events(&mut self) -> ConnectionEvents {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    /// Advance the state machine with a backend completion
    pub fn dispatch(&mut self, message: LinkMessage) {
        if message.generation != self.generation || self.state == ConnectionState::Idle {
            debug!(
                stale = %message.generation,
                current = %self.generation,
                state = %self.state,
                "discarding stale link event"
            );
            return;
        }

        match (self.state, message.event) {
            (ConnectionState::Connecting, LinkEvent::LinkUp) => {
                self.transition_to(ConnectionState::LinkUp);
                self.outbox.push(ConnectionEvent::Connected);
                self.transition_to(ConnectionState::DiscoveringServices);
                self.link.discover_services(self.generation);
            }

            (_, LinkEvent::LinkFailed { description }) => {
                self.fail(
                    ErrorKind::LinkError,
                    format!("Connection error: {}", description),
                );
            }

            (ConnectionState::DiscoveringServices, LinkEvent::ServicesDiscovered { services }) => {
                self.resolve_service(&services);
            }

            (
                ConnectionState::DiscoveringCharacteristic,
                LinkEvent::DetailsDiscovered { characteristics },
            ) => {
                self.resolve_characteristic(&characteristics);
            }

            (_, LinkEvent::ServiceFailed { description }) => {
                self.fail(
                    ErrorKind::ServiceError,
                    format!("Service error: {}", description),
                );
            }

            (
                ConnectionState::Ready,
                LinkEvent::CharacteristicChanged {
                    characteristic,
                    value,
                },
            ) => {
                if Some(characteristic) == self.resolved_characteristic() {
                    self.outbox.push(ConnectionEvent::ChunkReceived(value));
                } else {
                    debug!(%characteristic, "ignoring notification from other characteristic");
                }
            }

            (_, LinkEvent::LinkLost) => {
                info!(generation = %self.generation, "peripheral dropped the link");
                self.disconnect();
            }

            (_, LinkEvent::StackFailure { description }) => {
                self.fail(ErrorKind::UnknownError, description);
            }

            (state, event) => {
                warn!(%state, ?event, "ignoring link event not expected in this state");
            }
        }
    }

    fn resolve_service(&mut self, services: &[Uuid]) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let target = active.target_service;
        if !services.contains(&target) {
            let description = format!(
                "Cannot find service {} on device {}!",
                target,
                self.device_name()
            );
            self.fail(ErrorKind::ServiceError, description);
            return;
        }

        active.service = Some(target);
        let characteristic = active.target_characteristic;
        self.transition_to(ConnectionState::ServiceResolved);
        self.transition_to(ConnectionState::DiscoveringCharacteristic);
        self.link
            .discover_details(self.generation, target, characteristic);
    }

    fn resolve_characteristic(&mut self, characteristics: &[Uuid]) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let target = active.target_characteristic;
        if !characteristics.contains(&target) {
            let description = format!(
                "Invalid characteristic {} on device {}!",
                target,
                self.device_name()
            );
            self.fail(ErrorKind::CharacteristicError, description);
            return;
        }

        active.characteristic = Some(target);
        self.transition_to(ConnectionState::Ready);
        info!(generation = %self.generation, "link ready");
        self.outbox.push(ConnectionEvent::Ready);
    }

    fn fail(&mut self, kind: ErrorKind, description: String) {
        error!(%kind, generation = %self.generation, "{}", description);
        self.outbox.push(ConnectionEvent::Error { kind, description });
        self.disconnect();
    }

    fn transition_to(&mut self, next: ConnectionState) {
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn resolved_characteristic(&self) -> Option<Uuid> {
        self.active.as_ref().and_then(|active| active.characteristic)
    }

    fn device_name(&self) -> &str {
        self.active
            .as_ref()
            .map(|active| active.device.name.as_str())
            .unwrap_or_default()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
