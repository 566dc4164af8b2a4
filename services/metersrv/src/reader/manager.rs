//! Reader lifecycle management
//!
//! [`ConnectionManager`] owns at most one running [`ConnectionLoop`]. Starting
//! a new target cancels the previous loop under the same lock that installs
//! the new one, so two loops never contend for a device.

use std::sync::Arc;

use meter_protocol::Measurement;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::connection::{ConnectionLoop, LoopOutputs, ReaderSettings};
use super::device::DeviceOpener;
use super::latest::LatestValue;
use super::status::{ConnectionStatus, LinkStatus};
use crate::sink::MeasurementSink;

/// Identifies one started reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderHandle {
    generation: u64,
    pub port: String,
    pub baud: u32,
}

impl ReaderHandle {
    pub fn new(generation: u64, port: impl Into<String>, baud: u32) -> Self {
        Self {
            generation,
            port: port.into(),
            baud,
        }
    }
}

/// Reader operations exposed to the API layer
pub trait ReaderControl: Send + Sync {
    fn start_reader(&self, port: &str, baud: u32) -> ReaderHandle;
    fn stop_reader(&self, handle: &ReaderHandle) -> bool;
    fn get_status(&self) -> ConnectionStatus;
    fn get_latest(&self) -> Option<Arc<Measurement>>;
}

struct ActiveLoop {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owner of the reader loop and its status record
pub struct ConnectionManager<D: DeviceOpener> {
    opener: Arc<D>,
    latest: Arc<LatestValue>,
    sink: Arc<dyn MeasurementSink>,
    settings: ReaderSettings,
    status: Arc<LinkStatus>,
    active: Mutex<Option<ActiveLoop>>,
}

impl<D: DeviceOpener> ConnectionManager<D> {
    pub fn new(
        opener: D,
        latest: Arc<LatestValue>,
        sink: Arc<dyn MeasurementSink>,
        settings: ReaderSettings,
    ) -> Self {
        let status = Arc::new(LinkStatus::new(settings.stale_after));
        Self {
            opener: Arc::new(opener),
            latest,
            sink,
            settings,
            status,
            active: Mutex::new(None),
        }
    }

    /// Cancel any running loop and start one for `port`/`baud`
    ///
    /// Never fails: the device is opened asynchronously inside the loop and
    /// open failures show up in [`ConnectionStatus::last_error`].
    /// Must be called from within a tokio runtime.
    pub fn start(&self, port: impl Into<String>, baud: u32) -> ReaderHandle {
        let port = port.into();
        let mut active = self.active.lock();

        if let Some(previous) = active.take() {
            debug!("Cancelling reader generation {}", previous.generation);
            previous.cancel.cancel();
        }

        let generation = self.status.retarget(&port, baud);
        let outputs = LoopOutputs {
            latest: self.latest.clone(),
            sink: self.sink.clone(),
            status: self.status.clone(),
            status_generation: generation,
            value_generation: self.latest.advance(),
        };
        let cancel = CancellationToken::new();
        let connection = ConnectionLoop::new(
            self.opener.clone(),
            port.clone(),
            baud,
            self.settings.clone(),
            outputs,
            cancel.clone(),
        );
        let task = tokio::spawn(connection.run());

        *active = Some(ActiveLoop {
            generation,
            cancel,
            task,
        });
        info!("Reader targeting {}@{} (generation {})", port, baud, generation);

        ReaderHandle::new(generation, port, baud)
    }

    /// Hot-swap the target; same as [`ConnectionManager::start`]
    pub fn set_port(&self, port: impl Into<String>, baud: u32) -> ReaderHandle {
        self.start(port, baud)
    }

    /// Cancel the running loop, if any; the link reads as disconnected afterwards
    pub fn stop(&self) {
        let mut active = self.active.lock();
        self.halt(&mut active);
    }

    /// Stop only if `handle` still identifies the running loop
    pub fn stop_reader(&self, handle: &ReaderHandle) -> bool {
        let mut active = self.active.lock();
        let is_current = matches!(
            &*active,
            Some(running) if running.generation == handle.generation
        );
        if is_current {
            self.halt(&mut active);
        }
        is_current
    }

    /// Caller holds the `active` lock
    fn halt(&self, active: &mut Option<ActiveLoop>) {
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
            info!("Reader generation {} stopped", previous.generation);
        }
        self.status.halt();
        self.latest.advance();
    }

    /// Cancel the running loop and wait for it to release the device
    pub async fn shutdown(&self) {
        let previous = self.active.lock().take();
        self.status.halt();
        self.latest.advance();

        if let Some(previous) = previous {
            previous.cancel.cancel();
            let _ = previous.task.await;
            info!("Reader generation {} shut down", previous.generation);
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.snapshot()
    }

    pub fn latest(&self) -> Option<Arc<Measurement>> {
        self.latest.get()
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }
}

impl<D: DeviceOpener> ReaderControl for ConnectionManager<D> {
    fn start_reader(&self, port: &str, baud: u32) -> ReaderHandle {
        self.start(port, baud)
    }

    fn stop_reader(&self, handle: &ReaderHandle) -> bool {
        self.stop_reader(handle)
    }

    fn get_status(&self) -> ConnectionStatus {
        self.status()
    }

    fn get_latest(&self) -> Option<Arc<Measurement>> {
        self.latest()
    }
}

impl<D: DeviceOpener> Drop for ConnectionManager<D> {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeterSrvError;
    use crate::sink::NullSink;
    use async_trait::async_trait;
    use meter_protocol::testing::FrameBuilder;
    use meter_protocol::{BaseUnit, DecimalPoint, Mode};
    use std::io::Cursor;
    use std::time::Duration;

    /// Serves the same canned bytes on every open, or refuses `missing`
    struct CannedOpener {
        bytes: Vec<u8>,
    }

    #[async_trait]
    impl DeviceOpener for CannedOpener {
        type Port = Cursor<Vec<u8>>;

        async fn open(&self, port: &str, _baud: u32) -> crate::error::Result<Self::Port> {
            if port == "missing" {
                return Err(MeterSrvError::device("no such device"));
            }
            Ok(Cursor::new(self.bytes.clone()))
        }
    }

    fn manager() -> ConnectionManager<CannedOpener> {
        let frame = FrameBuilder::new()
            .digits([1, 2, 3, 4])
            .decimal(DecimalPoint::Tenths)
            .mode(Mode::Dc)
            .unit(BaseUnit::Volt)
            .build();
        let settings = ReaderSettings {
            open_retry_delay: Duration::from_millis(10),
            stream_retry_delay: Duration::from_millis(10),
            ..ReaderSettings::default()
        };
        ConnectionManager::new(
            CannedOpener {
                bytes: frame.to_vec(),
            },
            Arc::new(LatestValue::new()),
            Arc::new(NullSink),
            settings,
        )
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_start_decodes_and_connects() {
        let manager = manager();
        let handle = manager.start("COM3", 2400);
        assert_eq!(handle.port, "COM3");
        assert!(manager.is_running());

        assert!(wait_for(|| manager.status().connected).await);
        let latest = manager.latest().unwrap();
        assert_eq!(latest.value, Some(123.4));
        assert_eq!(latest.unit, "V");
        assert_eq!(manager.status().baud, 2400);

        manager.shutdown().await;
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let manager = manager();
        manager.start("missing", 2400);

        assert!(wait_for(|| !manager.status().last_error.is_empty()).await);
        let status = manager.status();
        assert!(!status.connected);
        assert!(status.last_error.contains("no such device"));
        assert!(manager.latest().is_none());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_disconnects_immediately() {
        let manager = manager();
        manager.start("COM3", 2400);
        assert!(wait_for(|| manager.status().connected).await);

        manager.stop();
        let status = manager.status();
        assert!(!status.connected);
        assert_eq!(status.last_frame_at, None);
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_stop_replacement() {
        let manager = manager();
        let first = manager.start("COM3", 2400);
        let second = manager.set_port("COM4", 9600);
        assert_ne!(first, second);

        assert!(!manager.stop_reader(&first));
        assert!(manager.is_running());
        assert_eq!(manager.status().port, "COM4");

        assert!(manager.stop_reader(&second));
        assert!(!manager.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stale_stop_racing_a_restart_never_stops_the_replacement() {
        let manager = manager();
        let runtime = tokio::runtime::Handle::current();

        for i in 0..200u32 {
            let stale = manager.start(format!("COM{i}"), 2400);
            let (replacement, stopped) = std::thread::scope(|scope| {
                let starter = scope.spawn(|| {
                    let _guard = runtime.enter();
                    manager.set_port("COM-next", 9600)
                });
                let stopper = scope.spawn(|| manager.stop_reader(&stale));
                (starter.join().unwrap(), stopper.join().unwrap())
            });

            // Whichever ran first, the replacement must survive
            assert!(manager.is_running(), "iteration {i}: stopped = {stopped}");
            assert_eq!(manager.status().port, replacement.port);
        }

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_reader_control_object() {
        let manager: Arc<dyn ReaderControl> = Arc::new(manager());
        let handle = manager.start_reader("COM3", 2400);
        assert!(wait_for(|| manager.get_latest().is_some()).await);
        assert_eq!(manager.get_status().port, "COM3");
        assert!(manager.stop_reader(&handle));
    }
}
