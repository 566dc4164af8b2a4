//! HP-90EPC multimeter protocol
//!
//! The meter streams a fixed 14-byte frame per display update. Every byte
//! carries its 1-based position in the high nibble (`0x1_` .. `0xE_`), the low
//! nibble holds segment and annunciator bits.
//!
//! ```text
//! serial bytes ──► FrameSynchronizer ──► [u8; 14] ──► decode_frame ──► Measurement
//! ```
//!
//! - [`FrameSynchronizer`] slices an unbounded byte stream into frames and
//!   recovers from dropped, duplicated or corrupted bytes without blocking.
//! - [`decode_frame`] turns one frame into a [`Measurement`]; it is a pure
//!   function with no state.

pub mod decoder;
pub mod error;
pub mod frame;
pub mod measurement;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use decoder::{decode, decode_frame, segment_pattern, DecimalPoint};
pub use error::{ProtocolError, Result};
pub use frame::{expected_tag, Frame, FrameSynchronizer, SyncStats, FRAME_LEN, START_TAG};
pub use measurement::{BaseUnit, Measurement, Mode, Prefix, NON_NUMERIC_PLACEHOLDER};
