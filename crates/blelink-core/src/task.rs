//! Async driver for a [`FrameCodec`]
//!
//! The codec itself is synchronous and single-threaded. [`LinkTask`] gives it
//! the single logical execution context it needs: one tokio task owns the
//! codec and processes, one at a time and in arrival order, application
//! requests from a [`LinkHandle`] and completions from the link backend.
//! Published events go out on an unbounded channel; the `connected`/`ready`
//! flags are mirrored into a watch channel before the events that changed
//! them are sent.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::connection::ConnectionManager;
use crate::errors::{BlelinkError, Result};
use crate::frame_codec::{FrameCodec, FrameEvent};
use crate::link::{link_channel, Link, LinkReceiver, LinkSender};
use crate::types::DeviceDescriptor;

// ----------------------------------------------------------------------------
// Channel Types
// ----------------------------------------------------------------------------

/// Requests accepted by the link task
#[derive(Debug)]
pub enum Request {
    Configure {
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    },
    Connect(DeviceDescriptor),
    Disconnect,
    Send {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Sender for link task requests
pub type RequestSender = mpsc::Sender<Request>;

/// Receiver for link task requests
pub type RequestReceiver = mpsc::Receiver<Request>;

/// Sender for published link events
pub type FrameEventSender = mpsc::UnboundedSender<FrameEvent>;

/// Receiver for published link events
pub type FrameEventReceiver = mpsc::UnboundedReceiver<FrameEvent>;

/// Snapshot of the link flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub connected: bool,
    pub ready: bool,
    pub device: Option<DeviceDescriptor>,
}

// ----------------------------------------------------------------------------
// Link Task
// ----------------------------------------------------------------------------

/// Task owning a [`FrameCodec`] and its backend
pub struct LinkTask<L: Link> {
    codec: FrameCodec<L>,
    requests: RequestReceiver,
    link_events: LinkReceiver,
    events: FrameEventSender,
    status: watch::Sender<LinkStatus>,
    running: bool,
}

impl<L: Link> LinkTask<L> {
    /// Assemble a task from its parts
    pub fn new(
        codec: FrameCodec<L>,
        requests: RequestReceiver,
        link_events: LinkReceiver,
        events: FrameEventSender,
        status: watch::Sender<LinkStatus>,
    ) -> Self {
        Self {
            codec,
            requests,
            link_events,
            events,
            status,
            running: true,
        }
    }

    /// Process requests and completions until shutdown
    ///
    /// The link is torn down on exit, so a dropped handle never leaves a
    /// peripheral connected.
    pub async fn run(mut self) -> Result<()> {
        info!("link task starting");
        self.publish();

        let mut backend_open = true;
        while self.running {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => {
                        info!("all link handles dropped, shutting down");
                        self.running = false;
                    }
                },
                message = self.link_events.recv(), if backend_open => match message {
                    Some(message) => self.codec.dispatch(message),
                    None => {
                        // Requests are still served; nothing will complete them
                        warn!("link backend closed its event channel");
                        backend_open = false;
                    }
                },
            }
            self.publish();
        }

        self.codec.disconnect();
        self.publish();
        info!("link task stopped");
        Ok(())
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Configure {
                service_uuid,
                characteristic_uuid,
            } => self.codec.configure(service_uuid, characteristic_uuid),
            Request::Connect(device) => self.codec.connect(device),
            Request::Disconnect => self.codec.disconnect(),
            Request::Send { payload, reply } => {
                let result = self.codec.send_message(&payload);
                if reply.send(result).is_err() {
                    debug!("send requester went away before the reply");
                }
            }
            Request::Shutdown => {
                info!("shutdown requested");
                self.running = false;
            }
        }
    }

    fn publish(&mut self) {
        let status = LinkStatus {
            connected: self.codec.is_connected(),
            ready: self.codec.is_ready(),
            device: self.codec.connected_device().cloned(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        for event in self.codec.take_events() {
            if self.events.send(event).is_err() {
                debug!("event receiver dropped");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Link Handle
// ----------------------------------------------------------------------------

/// Cloneable handle to a running [`LinkTask`]
#[derive(Debug, Clone)]
pub struct LinkHandle {
    requests: RequestSender,
    status: watch::Receiver<LinkStatus>,
}

impl LinkHandle {
    /// Set target identifiers for the next connection
    pub async fn configure(&self, service_uuid: Uuid, characteristic_uuid: Uuid) -> Result<()> {
        self.request(Request::Configure {
            service_uuid,
            characteristic_uuid,
        })
        .await
    }

    /// Connect to `device`, superseding any current link
    pub async fn connect(&self, device: DeviceDescriptor) -> Result<()> {
        self.request(Request::Connect(device)).await
    }

    /// Disconnect the current link, if any
    pub async fn disconnect(&self) -> Result<()> {
        self.request(Request::Disconnect).await
    }

    /// Send one message; rejected when over 255 bytes, dropped when not ready
    pub async fn send_message(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.request(Request::Send {
            payload: payload.into(),
            reply,
        })
        .await?;
        response.await.map_err(|_| BlelinkError::TaskClosed)?
    }

    /// Stop the task, tearing down any link
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Request::Shutdown).await
    }

    /// Latest published flags
    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Whether a link exists
    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    /// Whether messages can be sent
    pub fn is_ready(&self) -> bool {
        self.status.borrow().ready
    }

    /// Wait until the link is ready
    ///
    /// Does not time out; wrap in `tokio::time::timeout` when the caller
    /// needs a bound.
    pub async fn wait_until_ready(&mut self) -> Result<()> {
        loop {
            if self.status.borrow_and_update().ready {
                return Ok(());
            }
            self.status
                .changed()
                .await
                .map_err(|_| BlelinkError::TaskClosed)?;
        }
    }

    async fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| BlelinkError::TaskClosed)
    }
}

// ----------------------------------------------------------------------------
// Spawning
// ----------------------------------------------------------------------------

/// Build a codec over the backend returned by `make_link` and spawn its task
///
/// `make_link` receives the sender its completions must be reported on.
/// Targets present in `config` are applied before the task starts.
pub fn spawn_link<L, F>(
    config: &LinkConfig,
    make_link: F,
) -> Result<(LinkHandle, FrameEventReceiver, JoinHandle<Result<()>>)>
where
    L: Link + 'static,
    F: FnOnce(LinkSender) -> L,
{
    config.validate()?;

    let (link_sender, link_receiver) = link_channel();
    let link = make_link(link_sender);
    let manager = match config.targets()? {
        Some((service, characteristic)) => {
            ConnectionManager::with_targets(link, service, characteristic)
        }
        None => ConnectionManager::new(link),
    };

    let (request_sender, request_receiver) = mpsc::channel(config.request_buffer);
    let (event_sender, event_receiver) = mpsc::unbounded_channel();
    let (status_sender, status_receiver) = watch::channel(LinkStatus::default());

    let task = LinkTask::new(
        FrameCodec::new(manager),
        request_receiver,
        link_receiver,
        event_sender,
        status_sender,
    );
    let join = tokio::spawn(task.run());

    let handle = LinkHandle {
        requests: request_sender,
        status: status_receiver,
    };
    Ok((handle, event_receiver, join))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLink;

    #[tokio::test]
    async fn test_send_before_ready_is_dropped() {
        let config = LinkConfig::new()
            .with_service_uuid("1234")
            .with_characteristic_uuid("5678");
        let (handle, _events, join) = spawn_link(&config, |_| MockLink::new()).unwrap();

        assert!(handle.send_message(b"hi".to_vec()).await.is_ok());
        assert!(!handle.is_ready());

        handle.shutdown().await.unwrap();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_send_is_rejected() {
        let (handle, _events, join) = spawn_link(&LinkConfig::new(), |_| MockLink::new()).unwrap();

        let result = handle.send_message(vec![0u8; 256]).await;
        assert!(matches!(result, Err(BlelinkError::PayloadTooLarge { .. })));

        handle.shutdown().await.unwrap();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handle_reports_closed_task() {
        let (handle, _events, join) = spawn_link(&LinkConfig::new(), |_| MockLink::new()).unwrap();
        handle.shutdown().await.unwrap();
        join.await.unwrap().unwrap();

        assert!(matches!(
            handle.disconnect().await,
            Err(BlelinkError::TaskClosed)
        ));
    }

    #[test]
    fn test_spawn_rejects_invalid_config() {
        let config = LinkConfig::new().with_service_uuid("not-a-uuid");
        let result = spawn_link(&config, |_| MockLink::new());
        assert!(result.is_err());
    }
}
