//! In-memory link backend for tests
//!
//! [`MockLink`] records every request it receives. Built with
//! [`MockLink::scripted`], it also answers requests from a
//! [`MockPeripheral`] description by sending completions on a
//! [`LinkSender`], which lets the async driver run end to end without a
//! radio.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::link::{Link, LinkEvent, LinkMessage, LinkSender};
use crate::types::{DeviceDescriptor, Generation};

// ----------------------------------------------------------------------------
// Recorded Requests
// ----------------------------------------------------------------------------

/// A request issued to a link backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRequest {
    Connect {
        generation: Generation,
        device: DeviceDescriptor,
    },
    DiscoverServices {
        generation: Generation,
    },
    DiscoverDetails {
        generation: Generation,
        service: Uuid,
        characteristic: Uuid,
    },
    Write {
        generation: Generation,
        characteristic: Uuid,
        data: Vec<u8>,
    },
    Disconnect {
        generation: Generation,
    },
}

// ----------------------------------------------------------------------------
// Scripted Peripheral
// ----------------------------------------------------------------------------

/// GATT layout and behavior of a simulated peripheral
#[derive(Debug, Clone, Default)]
pub struct MockPeripheral {
    /// Services and the characteristics they contain
    pub services: BTreeMap<Uuid, Vec<Uuid>>,
    /// Fail the connection with this description instead of linking up
    pub refuse_connection: Option<String>,
    /// Echo writes back as notifications split into chunks of this size
    pub echo_chunk_size: Option<usize>,
}

impl MockPeripheral {
    /// Peripheral exposing no services
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service with its characteristics
    pub fn with_service(mut self, service: Uuid, characteristics: Vec<Uuid>) -> Self {
        self.services.insert(service, characteristics);
        self
    }

    /// Refuse connection attempts
    pub fn refusing(mut self, description: impl Into<String>) -> Self {
        self.refuse_connection = Some(description.into());
        self
    }

    /// Echo every write back as notification chunks
    pub fn with_echo(mut self, chunk_size: usize) -> Self {
        self.echo_chunk_size = Some(chunk_size.max(1));
        self
    }
}

// ----------------------------------------------------------------------------
// Mock Link
// ----------------------------------------------------------------------------

/// Recording (and optionally self-answering) link backend
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    requests: Arc<Mutex<Vec<LinkRequest>>>,
    script: Option<(LinkSender, MockPeripheral)>,
}

impl MockLink {
    /// Mock that only records requests
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that answers requests according to `peripheral`
    pub fn scripted(events: LinkSender, peripheral: MockPeripheral) -> Self {
        Self {
            requests: Arc::default(),
            script: Some((events, peripheral)),
        }
    }

    /// Snapshot of the requests received so far
    pub fn requests(&self) -> Vec<LinkRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Shared request log, usable after the mock moved into a task
    pub fn request_log(&self) -> Arc<Mutex<Vec<LinkRequest>>> {
        Arc::clone(&self.requests)
    }

    fn record(&self, request: LinkRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
    }

    fn reply(&self, generation: Generation, event: LinkEvent) {
        if let Some((events, _)) = &self.script {
            let _ = events.send(LinkMessage::new(generation, event));
        }
    }

    fn peripheral(&self) -> Option<&MockPeripheral> {
        self.script.as_ref().map(|(_, peripheral)| peripheral)
    }
}

impl Link for MockLink {
    fn connect(&mut self, generation: Generation, device: &DeviceDescriptor) {
        self.record(LinkRequest::Connect {
            generation,
            device: device.clone(),
        });

        let refusal = self
            .peripheral()
            .and_then(|peripheral| peripheral.refuse_connection.clone());
        match refusal {
            Some(description) => self.reply(generation, LinkEvent::LinkFailed { description }),
            None => self.reply(generation, LinkEvent::LinkUp),
        }
    }

    fn discover_services(&mut self, generation: Generation) {
        self.record(LinkRequest::DiscoverServices { generation });

        let services = self
            .peripheral()
            .map(|peripheral| peripheral.services.keys().copied().collect())
            .unwrap_or_default();
        self.reply(generation, LinkEvent::ServicesDiscovered { services });
    }

    fn discover_details(&mut self, generation: Generation, service: Uuid, characteristic: Uuid) {
        self.record(LinkRequest::DiscoverDetails {
            generation,
            service,
            characteristic,
        });

        let characteristics = self
            .peripheral()
            .and_then(|peripheral| peripheral.services.get(&service).cloned())
            .unwrap_or_default();
        self.reply(generation, LinkEvent::DetailsDiscovered { characteristics });
    }

    fn write(&mut self, generation: Generation, characteristic: Uuid, data: Vec<u8>) {
        self.record(LinkRequest::Write {
            generation,
            characteristic,
            data: data.clone(),
        });

        if let Some(chunk_size) = self.peripheral().and_then(|p| p.echo_chunk_size) {
            for chunk in data.chunks(chunk_size) {
                self.reply(
                    generation,
                    LinkEvent::CharacteristicChanged {
                        characteristic,
                        value: chunk.to_vec(),
                    },
                );
            }
        }
    }

    fn disconnect(&mut self, generation: Generation) {
        self.record(LinkRequest::Disconnect { generation });
        // Real stacks report the drop of a link they were asked to close
        self.reply(generation, LinkEvent::LinkLost);
    }
}
