//! Single-peripheral BLE messaging core
//!
//! This crate turns a platform BLE stack into a reliable-ordered,
//! length-framed message channel to one peripheral. It knows nothing about
//! radios: platform stacks plug in through the [`Link`] and [`DeviceScanner`]
//! traits.
//!
//! ## Architecture
//!
//! - [`connection`] - Lifecycle state machine (connect, discovery, teardown)
//! - [`codec`] - One-byte length prefix framing and chunk reassembly
//! - [`frame_codec`] - Message-level wrapper with mirrored connection flags
//! - [`task`] - Tokio task driving a codec, plus a cloneable handle
//! - [`link`] - Backend and scanner traits
//! - [`config`] - Target identifiers and driver sizing
//! - [`testing`] - Recording in-memory backend
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blelink_core::{spawn_link, DeviceDescriptor, FrameEvent, LinkConfig};
//! use blelink_core::testing::MockLink;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LinkConfig::new()
//!     .with_service_uuid("1234")
//!     .with_characteristic_uuid("5678");
//!
//! let (mut handle, mut events, _task) = spawn_link(&config, |_| MockLink::new())?;
//! handle
//!     .connect(DeviceDescriptor::new("id", "AA:BB:CC:DD:EE:FF", "sensor"))
//!     .await?;
//! handle.wait_until_ready().await?;
//! handle.send_message(b"hi".to_vec()).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let FrameEvent::MessageReceived(bytes) = event {
//!         println!("{:?}", bytes);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod errors;
pub mod frame_codec;
pub mod link;
pub mod task;
pub mod testing;
pub mod types;

pub use codec::{encode_frame, Reassembler, FRAME_HEADER_LEN, MAX_PAYLOAD_LEN};
pub use config::LinkConfig;
pub use connection::{ConnectionEvent, ConnectionEvents, ConnectionManager, ConnectionState};
pub use errors::{BlelinkError, ErrorKind, Result};
pub use frame_codec::{FrameCodec, FrameEvent, FrameEvents};
pub use link::{link_channel, DeviceScanner, Link, LinkEvent, LinkMessage, LinkReceiver, LinkSender};
pub use task::{spawn_link, FrameEventReceiver, LinkHandle, LinkStatus, LinkTask, Request};
pub use types::{
    parse_target_uuid, uuid_from_u16, DeviceDescriptor, Generation, BLUETOOTH_BASE_UUID,
};
