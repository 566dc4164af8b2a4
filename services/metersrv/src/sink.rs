//! Measurement sinks
//!
//! Every successfully decoded frame is pushed to one sink after it has been
//! stored as the latest value. Rate limiting and persistence are the sink's
//! own business.

use meter_protocol::Measurement;

/// Receiver of decoded measurements
pub trait MeasurementSink: Send + Sync {
    fn push(&self, measurement: &Measurement);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MeasurementSink for NullSink {
    fn push(&self, _measurement: &Measurement) {}
}
