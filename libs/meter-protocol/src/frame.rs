//! Stream synchronization
//!
//! The meter has no start-of-frame marker and no checksum; position is only
//! known from the high nibble of each byte. [`FrameSynchronizer`] keeps a
//! cursor into a scratch frame and advances it one byte at a time, so it can
//! be fed arbitrarily sized chunks as they come off the port.

use tracing::trace;

use crate::error::{ProtocolError, Result};

/// Bytes per frame
pub const FRAME_LEN: usize = 14;

/// Tag of the first byte of every frame
pub const START_TAG: u8 = 0x10;

/// One complete, tag-checked frame
pub type Frame = [u8; FRAME_LEN];

/// High nibble required at `index` (0 => 0x10, 13 => 0xE0)
#[inline]
pub const fn expected_tag(index: usize) -> u8 {
    ((index as u8) + 1) << 4
}

#[inline]
const fn tag_of(byte: u8) -> u8 {
    byte & 0xF0
}

/// Check every positional tag of a candidate frame
pub fn validate_tags(bytes: &[u8]) -> Result<()> {
    for (index, &byte) in bytes.iter().enumerate() {
        let expected = expected_tag(index);
        if tag_of(byte) != expected {
            return Err(ProtocolError::TagMismatch {
                index,
                expected,
                byte,
            });
        }
    }
    Ok(())
}

/// Rolling counters for diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Completed frames
    pub frames: u64,
    /// Bytes that broke the expected tag sequence
    pub resyncs: u64,
}

/// Byte-stream to frame synchronizer
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    buffer: Frame,
    cursor: usize,
    stats: SyncStats,
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self {
            buffer: [0; FRAME_LEN],
            cursor: 0,
            stats: SyncStats::default(),
        }
    }

    /// Index of the next expected byte (0..FRAME_LEN)
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Return the counters and start a new window
    pub fn take_stats(&mut self) -> SyncStats {
        std::mem::take(&mut self.stats)
    }

    /// Drop the frame in progress
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Advance by one byte, returning a frame when it completes one
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        if tag_of(byte) == expected_tag(self.cursor) {
            self.buffer[self.cursor] = byte;
            self.cursor += 1;
            if self.cursor == FRAME_LEN {
                self.cursor = 0;
                self.stats.frames += 1;
                return Some(self.buffer);
            }
            return None;
        }

        self.stats.resyncs += 1;
        trace!(
            "Resync at cursor {}: got {:#04X}, expected tag {:#04X}",
            self.cursor,
            byte,
            expected_tag(self.cursor)
        );

        // A start tag can open the next frame right away
        if tag_of(byte) == START_TAG {
            self.buffer[0] = byte;
            self.cursor = 1;
        } else {
            self.cursor = 0;
        }
        None
    }

    /// Feed a chunk, invoking `on_frame` for every frame it completes
    pub fn push<F>(&mut self, bytes: &[u8], mut on_frame: F)
    where
        F: FnMut(&Frame),
    {
        for &byte in bytes {
            if let Some(frame) = self.push_byte(byte) {
                on_frame(&frame);
            }
        }
    }

    /// Feed a chunk and collect the completed frames
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        self.push(bytes, |frame| frames.push(*frame));
        frames
    }
}
