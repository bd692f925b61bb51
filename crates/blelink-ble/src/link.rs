//! btleplug implementation of the core [`Link`] trait
//!
//! Each connect attempt gets its own session worker task. The worker owns the
//! peripheral for that generation, runs discovery and writes strictly in the
//! order they were requested, and forwards notifications and adapter
//! disconnects. Every report it sends is tagged with the generation it was
//! spawned for; the core drops reports from superseded sessions.
//!
//! Tearing a session down releases its peripheral in the background. Releases
//! are chained, and a new session waits for the latest one before touching
//! the radio, so a reconnect to the same device never races the disconnect of
//! the previous attempt.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use blelink_core::{DeviceDescriptor, Generation, Link, LinkEvent, LinkMessage, LinkSender};
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Peripheral as _, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Peripheral};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{Stream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::find_peripheral;
use crate::config::BleConfig;
use crate::error::BleLinkError;

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;
type CentralEventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;
type PeripheralSlot = Arc<Mutex<Option<Peripheral>>>;

/// Completion of a background peripheral release, awaitable from many places
type Release = Shared<BoxFuture<'static, ()>>;

// ----------------------------------------------------------------------------
// Session Types
// ----------------------------------------------------------------------------

/// Work queued for a session worker
#[derive(Debug)]
enum SessionCommand {
    DiscoverServices,
    DiscoverDetails { service: Uuid, characteristic: Uuid },
    Write(Uuid, Vec<u8>),
}

/// Handle to the worker serving one generation
struct Session {
    generation: Generation,
    commands: mpsc::UnboundedSender<SessionCommand>,
    worker: JoinHandle<()>,
    peripheral: PeripheralSlot,
}

impl Session {
    /// Stop the worker and release the peripheral once `previous` has finished
    fn close(self, previous: Option<Release>) -> Release {
        self.worker.abort();
        let generation = self.generation;
        let slot = self.peripheral;
        chain_release(generation, previous, async move {
            let peripheral = slot.lock().await.take();
            if let Some(peripheral) = peripheral {
                if let Err(e) = peripheral.disconnect().await {
                    warn!(generation = %generation, "Failed to disconnect peripheral: {}", e);
                } else {
                    debug!(generation = %generation, "peripheral released");
                }
            }
        })
    }
}

/// Run `release` in the background after `previous`, returning its completion
fn chain_release<F>(generation: Generation, previous: Option<Release>, release: F) -> Release
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        if let Some(previous) = previous {
            previous.await;
        }
        release.await;
    });

    async move {
        if let Err(e) = task.await {
            warn!(generation = %generation, "peripheral release task failed: {}", e);
        }
    }
    .boxed()
    .shared()
}

/// Everything a worker needs, moved into its task
struct SessionContext {
    adapter: Adapter,
    device: DeviceDescriptor,
    generation: Generation,
    events: LinkSender,
    peripheral: PeripheralSlot,
    write_type: WriteType,
    release: Option<Release>,
}

impl SessionContext {
    fn report(&self, event: LinkEvent) {
        if self.events.send(LinkMessage::new(self.generation, event)).is_err() {
            debug!(generation = %self.generation, "link event receiver dropped");
        }
    }
}

// ----------------------------------------------------------------------------
// btleplug Link
// ----------------------------------------------------------------------------

/// Central-role link over a btleplug adapter
///
/// Must be used from within a tokio runtime; requests spawn tasks.
pub struct BtleplugLink {
    adapter: Adapter,
    config: BleConfig,
    events: LinkSender,
    session: Option<Session>,
    release: Option<Release>,
}

impl BtleplugLink {
    /// Create a link reporting completions on `events`
    pub fn new(adapter: Adapter, config: BleConfig, events: LinkSender) -> Self {
        Self {
            adapter,
            config,
            events,
            session: None,
            release: None,
        }
    }

    fn close_session(&mut self, session: Session) {
        let previous = self.release.take();
        self.release = Some(session.close(previous));
    }

    fn submit(&self, generation: Generation, command: SessionCommand) {
        match &self.session {
            Some(session) if session.generation == generation => {
                if session.commands.send(command).is_err() {
                    debug!(generation = %generation, "session worker already finished");
                }
            }
            _ => debug!(
                generation = %generation,
                ?command,
                "no session for generation, request dropped"
            ),
        }
    }
}

impl Link for BtleplugLink {
    fn connect(&mut self, generation: Generation, device: &DeviceDescriptor) {
        if let Some(previous) = self.session.take() {
            self.close_session(previous);
        }

        let (commands, receiver) = mpsc::unbounded_channel();
        let peripheral = PeripheralSlot::default();
        let context = SessionContext {
            adapter: self.adapter.clone(),
            device: device.clone(),
            generation,
            events: self.events.clone(),
            peripheral: Arc::clone(&peripheral),
            write_type: self.config.write_type(),
            release: self.release.clone(),
        };
        let worker = tokio::spawn(run_session(context, receiver));

        self.session = Some(Session {
            generation,
            commands,
            worker,
            peripheral,
        });
    }

    fn discover_services(&mut self, generation: Generation) {
        self.submit(generation, SessionCommand::DiscoverServices);
    }

    fn discover_details(&mut self, generation: Generation, service: Uuid, characteristic: Uuid) {
        self.submit(
            generation,
            SessionCommand::DiscoverDetails {
                service,
                characteristic,
            },
        );
    }

    fn write(&mut self, generation: Generation, characteristic: Uuid, data: Vec<u8>) {
        self.submit(generation, SessionCommand::Write(characteristic, data));
    }

    fn disconnect(&mut self, generation: Generation) {
        match self.session.take() {
            Some(session) if session.generation == generation => self.close_session(session),
            Some(session) => {
                debug!(
                    requested = %generation,
                    active = %session.generation,
                    "disconnect for another generation ignored"
                );
                self.session = Some(session);
            }
            None => debug!(generation = %generation, "disconnect with no session"),
        }
    }
}

impl Drop for BtleplugLink {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.worker.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Session Worker
// ----------------------------------------------------------------------------

/// Per-session resources built up while handling commands
#[derive(Default)]
struct SessionState {
    notifications: Option<NotificationStream>,
    characteristic: Option<Characteristic>,
}

async fn run_session(
    mut context: SessionContext,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) {
    if let Some(release) = context.release.take() {
        debug!(generation = %context.generation, "waiting for previous link release");
        release.await;
    }

    let peripheral = match find_peripheral(&context.adapter, &context.device).await {
        Ok(peripheral) => peripheral,
        Err(BleLinkError::Btleplug(e)) => {
            context.report(LinkEvent::StackFailure {
                description: e.to_string(),
            });
            return;
        }
        Err(e) => {
            context.report(LinkEvent::LinkFailed {
                description: e.to_string(),
            });
            return;
        }
    };

    // Stored before connecting so a teardown mid-connect still releases it
    *context.peripheral.lock().await = Some(peripheral.clone());

    let mut central_events: Option<CentralEventStream> = match context.adapter.events().await {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Failed to get BLE events, link loss will go unnoticed: {}", e);
            None
        }
    };

    if let Err(e) = peripheral.connect().await {
        context.report(LinkEvent::LinkFailed {
            description: BleLinkError::ConnectionFailed(e.to_string()).to_string(),
        });
        return;
    }

    let mut state = SessionState::default();

    info!(generation = %context.generation, device = %context.device, "link up");
    context.report(LinkEvent::LinkUp);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    if let Some(event) =
                        handle_command(&context, &peripheral, command, &mut state).await
                    {
                        context.report(event);
                    }
                }
                None => break,
            },
            notification = next_item(&mut state.notifications) => match notification {
                Some(notification) => context.report(LinkEvent::CharacteristicChanged {
                    characteristic: notification.uuid,
                    value: notification.value,
                }),
                None => {
                    debug!(generation = %context.generation, "notification stream ended");
                    state.notifications = None;
                }
            },
            event = next_item(&mut central_events) => match event {
                Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral.id() => {
                    info!(generation = %context.generation, "peripheral disconnected");
                    context.report(LinkEvent::LinkLost);
                    break;
                }
                Some(_) => {}
                None => central_events = None,
            },
        }
    }
}

async fn handle_command(
    context: &SessionContext,
    peripheral: &Peripheral,
    command: SessionCommand,
    state: &mut SessionState,
) -> Option<LinkEvent> {
    match command {
        SessionCommand::DiscoverServices => {
            if let Err(e) = peripheral.discover_services().await {
                return Some(LinkEvent::LinkFailed {
                    description: BleLinkError::ServiceDiscoveryFailed(e.to_string()).to_string(),
                });
            }
            let services: Vec<Uuid> = peripheral.services().iter().map(|s| s.uuid).collect();
            debug!(count = services.len(), "services discovered");
            Some(LinkEvent::ServicesDiscovered { services })
        }

        SessionCommand::DiscoverDetails {
            service: service_uuid,
            characteristic: characteristic_uuid,
        } => {
            let service = peripheral
                .services()
                .into_iter()
                .find(|service| service.uuid == service_uuid);
            let Some(service) = service else {
                return Some(LinkEvent::ServiceFailed {
                    description: format!("service {} is no longer available", service_uuid),
                });
            };

            // An absent target is reported by the core once it sees the list
            let target = service
                .characteristics
                .iter()
                .find(|c| c.uuid == characteristic_uuid)
                .cloned();
            if let Some(characteristic) = &target {
                if let Some(event) = enable_notifications(peripheral, characteristic, state).await
                {
                    return Some(event);
                }
            }
            state.characteristic = target;

            let characteristics = service.characteristics.iter().map(|c| c.uuid).collect();
            Some(LinkEvent::DetailsDiscovered { characteristics })
        }

        SessionCommand::Write(characteristic_uuid, data) => {
            let characteristic = state
                .characteristic
                .as_ref()
                .filter(|c| c.uuid == characteristic_uuid);
            let Some(characteristic) = characteristic else {
                return Some(LinkEvent::ServiceFailed {
                    description: BleLinkError::CharacteristicNotFound(
                        characteristic_uuid.to_string(),
                    )
                    .to_string(),
                });
            };

            match peripheral
                .write(characteristic, &data, context.write_type)
                .await
            {
                Ok(()) => {
                    debug!(len = data.len(), "characteristic written");
                    None
                }
                Err(e) => Some(LinkEvent::ServiceFailed {
                    description: BleLinkError::WriteFailed(e.to_string()).to_string(),
                }),
            }
        }
    }
}

/// Subscribe to the target characteristic when it can notify or indicate
async fn enable_notifications(
    peripheral: &Peripheral,
    characteristic: &Characteristic,
    state: &mut SessionState,
) -> Option<LinkEvent> {
    if !characteristic
        .properties
        .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
    {
        debug!(characteristic = %characteristic.uuid, "target does not notify");
        return None;
    }

    if let Err(e) = peripheral.subscribe(characteristic).await {
        return Some(LinkEvent::ServiceFailed {
            description: BleLinkError::SubscriptionFailed(e.to_string()).to_string(),
        });
    }
    debug!(characteristic = %characteristic.uuid, "notifications enabled");

    if state.notifications.is_none() {
        match peripheral.notifications().await {
            Ok(stream) => state.notifications = Some(stream),
            Err(e) => {
                return Some(LinkEvent::ServiceFailed {
                    description: BleLinkError::EventStreamFailed(e.to_string()).to_string(),
                })
            }
        }
    }
    None
}

/// Next item of an optional stream; pending forever when there is none
async fn next_item<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::Mutex as StdMutex;
    use tokio::time::{sleep, Duration};
    use tokio_test::{assert_pending, task};

    #[tokio::test]
    async fn test_next_item_drains_stream() {
        let mut source = Some(stream::iter(vec![1u8, 2]));
        assert_eq!(next_item(&mut source).await, Some(1));
        assert_eq!(next_item(&mut source).await, Some(2));
        assert_eq!(next_item(&mut source).await, None);
    }

    #[test]
    fn test_next_item_without_stream_never_resolves() {
        let mut source: Option<stream::Iter<std::vec::IntoIter<u8>>> = None;
        let mut pending = task::spawn(next_item(&mut source));
        assert_pending!(pending.poll());
        assert_pending!(pending.poll());
    }

    #[tokio::test]
    async fn test_chained_releases_finish_in_order() {
        let order = Arc::new(StdMutex::new(Vec::new()));

        let first_order = Arc::clone(&order);
        let first = chain_release(Generation::default(), None, async move {
            sleep(Duration::from_millis(30)).await;
            first_order.lock().unwrap().push(1);
        });

        let second_order = Arc::clone(&order);
        let second = chain_release(Generation::default().next(), Some(first), async move {
            second_order.lock().unwrap().push(2);
        });

        // A new session waits on the latest release only
        second.clone().await;
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        second.await;
    }
}
