//! Length-prefixed message framing
//!
//! ## Wire Format
//!
//! A frame is one unsigned length byte followed by exactly that many payload
//! bytes, sent as a single characteristic write:
//!
//! ```text
//! +--------+------------------+
//! | len u8 | payload[len]     |
//! +--------+------------------+
//! ```
//!
//! There is no checksum, no multi-byte length and no escaping.
//!
//! ## Reassembly
//!
//! Notifications may split a frame over several chunks. [`Reassembler`] reads
//! the declared length from the first byte of a fresh frame and then counts
//! down as chunks arrive. It never re-splits a chunk: when a chunk carries
//! more bytes than the frame still needs, the surplus stays in the emitted
//! message and the counter goes negative.

use tracing::trace;

use crate::errors::{BlelinkError, Result};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Largest payload a single frame can carry
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 1;

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Build the frame for `payload`
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u8::try_from(payload.len()).map_err(|_| BlelinkError::PayloadTooLarge {
        size: payload.len(),
        max_size: MAX_PAYLOAD_LEN,
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.push(len);
    frame.extend_from_slice(payload);
    Ok(frame)
}

// ----------------------------------------------------------------------------
// Reassembly
// ----------------------------------------------------------------------------

/// Inbound frame reassembly state
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Vec<u8>,
    remaining: isize,
    in_progress: bool,
}

impl Reassembler {
    /// Create an empty reassembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk, returning a message once its frame is complete
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        if chunk.is_empty() {
            return None;
        }

        if self.in_progress {
            self.buffer.extend_from_slice(chunk);
            self.remaining -= chunk.len() as isize;
        } else {
            let declared = chunk[0] as isize;
            self.buffer = chunk[FRAME_HEADER_LEN..].to_vec();
            self.remaining = declared - self.buffer.len() as isize;
        }

        self.in_progress = self.remaining > 0;
        trace!(
            chunk_len = chunk.len(),
            remaining = self.remaining,
            "reassembly step"
        );

        if self.in_progress {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Whether a frame is partially received
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Bytes still expected for the current frame (may be negative after an oversized chunk)
    pub fn remaining(&self) -> isize {
        self.remaining
    }

    /// Payload bytes accumulated for the current frame
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.remaining = 0;
        self.in_progress = false;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
