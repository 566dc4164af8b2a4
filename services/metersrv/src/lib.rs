//! HP-90EPC multimeter reader service
//!
//! Reads the meter's 14-byte frame stream from a serial port, keeps the most
//! recent decoded measurement, optionally records it to CSV and serves both
//! over a small HTTP JSON API.
//!
//! ```text
//! serial port ──► reader::ConnectionManager ──► LatestValue ──► api (GET /api/live)
//!                         │
//!                         └──► MeasurementSink (CsvRecorder)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod logging;
pub mod reader;
pub mod recorder;
pub mod shutdown;
pub mod sink;

pub use error::{MeterSrvError, Result};
pub use shutdown::{wait_for_shutdown, ShutdownSignal};
