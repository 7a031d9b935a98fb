//! Buffer for accumulating partial reads into lines.
//!
//! Uses `bytes::BytesMut` so complete lines are split off without copying.
//! Tracks how far the buffer has already been searched for the terminator so
//! a long line arriving in many chunks is scanned only once.
//!
//! # Example
//!
//! ```ignore
//! let mut buffer = LineBuffer::new();
//!
//! buffer.push(b"cid=1 name=Lo");
//! assert!(buffer.take_line(b"\n").is_none());
//!
//! buffer.push(b"bby\nerror id=0");
//! assert_eq!(&buffer.take_line(b"\n").unwrap()[..], b"cid=1 name=Lobby\n");
//! ```

use bytes::{Bytes, BytesMut};

use crate::protocol::CHUNK_SIZE;

/// Accumulates inbound bytes and hands them out as lines or slices.
pub struct LineBuffer {
    /// Bytes received but not yet consumed.
    buffer: BytesMut,
    /// Prefix of `buffer` known not to contain a terminator.
    scanned: usize,
}

impl LineBuffer {
    /// Create a new line buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(CHUNK_SIZE),
            scanned: 0,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Split off the first complete line, terminator included.
    ///
    /// Returns `None` if no terminator has arrived yet.
    pub fn take_line(&mut self, token: &[u8]) -> Option<Bytes> {
        if token.is_empty() {
            return None;
        }

        // Step back so a terminator straddling two chunks is still found
        let start = self.scanned.saturating_sub(token.len() - 1);
        let found = self.buffer[start..]
            .windows(token.len())
            .position(|w| w == token);

        match found {
            Some(pos) => {
                let end = start + pos + token.len();
                self.scanned = 0;
                Some(self.buffer.split_to(end).freeze())
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    /// Split off up to `max` bytes.
    pub fn take(&mut self, max: usize) -> Bytes {
        let n = max.min(self.buffer.len());
        self.scanned = self.scanned.saturating_sub(n);
        self.buffer.split_to(n).freeze()
    }

    /// Split off everything buffered.
    pub fn take_all(&mut self) -> Bytes {
        self.scanned = 0;
        self.buffer.split().freeze()
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
