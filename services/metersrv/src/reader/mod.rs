//! Serial reader: device access, connection loop and lifecycle
//!
//! ```text
//! DeviceOpener ──► ConnectionLoop ──► FrameSynchronizer ──► decode_frame
//!                        │                                       │
//!                        ▼                                       ▼
//!                    LinkStatus                  LatestValue + MeasurementSink
//! ```

mod connection;
mod device;
mod latest;
mod manager;
mod status;

pub use connection::{
    ReaderSettings, DEFAULT_OPEN_RETRY_DELAY, DEFAULT_STALE_AFTER, DEFAULT_STREAM_RETRY_DELAY,
};
pub use device::{DeviceOpener, SerialDeviceOpener};
pub use latest::LatestValue;
pub use manager::{ConnectionManager, ReaderControl, ReaderHandle};
pub use status::ConnectionStatus;
