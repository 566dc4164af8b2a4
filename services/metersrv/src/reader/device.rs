//! Byte-oriented device abstraction
//!
//! The reader only needs three things from a device: open it, read whatever
//! bytes are available, and close it. Close is `Drop` of the port value, so a
//! handle can never outlive the scope that opened it.

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info};

use crate::error::{MeterSrvError, Result};

/// Opens a readable byte stream for a port name and baud rate
#[async_trait]
pub trait DeviceOpener: Send + Sync + 'static {
    type Port: AsyncRead + Unpin + Send + 'static;

    /// Open the device; port and baud validation is left to the device layer
    async fn open(&self, port: &str, baud: u32) -> Result<Self::Port>;
}

/// Serial port opener (8 data bits, no parity, 1 stop bit, no flow control)
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialDeviceOpener;

#[async_trait]
impl DeviceOpener for SerialDeviceOpener {
    type Port = SerialStream;

    async fn open(&self, port: &str, baud: u32) -> Result<SerialStream> {
        debug!("Opening serial port: {}", port);

        #[allow(unused_mut)]
        let mut stream = tokio_serial::new(port, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| MeterSrvError::device(format!("Failed to open serial port {port}: {e}")))?;

        #[cfg(unix)]
        stream.set_exclusive(false).map_err(|e| {
            MeterSrvError::device(format!("Failed to set exclusive mode on {port}: {e}"))
        })?;

        info!("Opened serial port {} at {} baud", port, baud);
        Ok(stream)
    }
}
