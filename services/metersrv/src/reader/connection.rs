//! Reader connection loop
//!
//! One loop owns one device target. It runs as an explicit state machine:
//!
//! ```text
//!            open ok                    read error (400 ms)
//! Connecting ────────► Streaming ─────────────────────► Connecting
//!     │  ▲ open failed (600 ms)  │
//!     └──┘                       │ cancel
//!     │ cancel                   ▼
//!     └──────────────────► Terminated
//! ```
//!
//! The open port is moved into `Streaming` and dropped when that state is
//! left, whichever way it is left.

use std::sync::Arc;
use std::time::{Duration, Instant};

use meter_protocol::{decode_frame, FrameSynchronizer, Measurement};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::device::DeviceOpener;
use super::latest::LatestValue;
use super::status::LinkStatus;
use crate::sink::MeasurementSink;

/// Delay before retrying a failed open
pub const DEFAULT_OPEN_RETRY_DELAY: Duration = Duration::from_millis(600);
/// Delay before reopening after the stream failed
pub const DEFAULT_STREAM_RETRY_DELAY: Duration = Duration::from_millis(400);
/// Maximum age of the last frame for the link to count as connected
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3);

/// Reader loop tunables
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub stale_after: Duration,
    pub open_retry_delay: Duration,
    pub stream_retry_delay: Duration,
    /// Period of the diagnostic counter log line
    pub stats_interval: Duration,
    /// Pause after a zero-length read so a port stuck at EOF does not spin
    pub idle_read_delay: Duration,
    pub read_buffer_size: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            open_retry_delay: DEFAULT_OPEN_RETRY_DELAY,
            stream_retry_delay: DEFAULT_STREAM_RETRY_DELAY,
            stats_interval: Duration::from_secs(1),
            idle_read_delay: Duration::from_millis(10),
            read_buffer_size: 256,
        }
    }
}

impl ReaderSettings {
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        if !stale_after.is_zero() {
            self.stale_after = stale_after;
        }
        self
    }
}

/// Where a loop delivers its results
///
/// Both generations are fixed when the loop is created; once the manager
/// moves on, every publish from this loop is refused.
pub(crate) struct LoopOutputs {
    pub(crate) latest: Arc<LatestValue>,
    pub(crate) sink: Arc<dyn MeasurementSink>,
    pub(crate) status: Arc<LinkStatus>,
    pub(crate) status_generation: u64,
    pub(crate) value_generation: u64,
}

impl LoopOutputs {
    fn publish(&self, measurement: Measurement) -> bool {
        let sink = &self.sink;
        let accepted = self
            .latest
            .publish(self.value_generation, Arc::new(measurement), |m| sink.push(m));
        accepted && self.status.mark_frame(self.status_generation)
    }

    fn report_error(&self, error: String) {
        self.status.mark_error(self.status_generation, error);
    }
}

enum LoopState<P> {
    Connecting,
    Streaming(P),
    Terminated,
}

enum StreamExit {
    Cancelled,
    Failed(std::io::Error),
}

#[derive(Debug)]
struct Counters {
    zero_reads: u64,
    window_start: Instant,
}

/// Open/read/retry loop for one port and baud rate
pub(crate) struct ConnectionLoop<D: DeviceOpener> {
    opener: Arc<D>,
    port: String,
    baud: u32,
    settings: ReaderSettings,
    outputs: LoopOutputs,
    cancel: CancellationToken,
    sync: FrameSynchronizer,
    counters: Counters,
}

impl<D: DeviceOpener> ConnectionLoop<D> {
    pub(crate) fn new(
        opener: Arc<D>,
        port: String,
        baud: u32,
        settings: ReaderSettings,
        outputs: LoopOutputs,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            opener,
            port,
            baud,
            settings,
            outputs,
            cancel,
            sync: FrameSynchronizer::new(),
            counters: Counters {
                zero_reads: 0,
                window_start: Instant::now(),
            },
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Reader loop started for {}@{}", self.port, self.baud);

        let mut state = LoopState::Connecting;
        loop {
            state = match state {
                LoopState::Connecting => self.connect().await,
                LoopState::Streaming(port) => self.stream(port).await,
                LoopState::Terminated => break,
            };
        }

        info!("Reader loop for {} terminated", self.port);
    }

    async fn connect(&mut self) -> LoopState<D::Port> {
        if self.cancel.is_cancelled() {
            return LoopState::Terminated;
        }

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.opener.open(&self.port, self.baud) => Some(result),
        };

        match opened {
            None => LoopState::Terminated,
            Some(Ok(port)) => {
                self.sync.reset();
                LoopState::Streaming(port)
            },
            Some(Err(e)) => {
                debug!("Open of {} failed: {}", self.port, e);
                self.outputs.report_error(e.to_string());
                self.backoff(self.settings.open_retry_delay).await
            },
        }
    }

    async fn stream(&mut self, mut port: D::Port) -> LoopState<D::Port> {
        let mut buf = vec![0u8; self.settings.read_buffer_size.max(1)];

        let exit = loop {
            if self.cancel.is_cancelled() {
                break StreamExit::Cancelled;
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = port.read(&mut buf) => Some(result),
            };

            match read {
                None => break StreamExit::Cancelled,
                Some(Ok(0)) => {
                    // Timeout or nothing available; not an error
                    self.counters.zero_reads += 1;
                    if !self.pause(self.settings.idle_read_delay).await {
                        break StreamExit::Cancelled;
                    }
                },
                Some(Ok(n)) => self.ingest(&buf[..n]),
                Some(Err(e)) => break StreamExit::Failed(e),
            }

            self.log_counters();
        };

        drop(port);

        match exit {
            StreamExit::Cancelled => {
                debug!("Closed {} on cancellation", self.port);
                LoopState::Terminated
            },
            StreamExit::Failed(e) => {
                warn!("Read error on {}, reconnecting: {}", self.port, e);
                self.outputs
                    .report_error(format!("Read error on {}: {e}", self.port));
                self.backoff(self.settings.stream_retry_delay).await
            },
        }
    }

    fn ingest(&mut self, bytes: &[u8]) {
        let outputs = &self.outputs;
        self.sync.push(bytes, |frame| {
            outputs.publish(decode_frame(frame));
        });
    }

    /// Sleep unless cancelled first; returns false on cancellation
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn backoff(&self, delay: Duration) -> LoopState<D::Port> {
        if self.pause(delay).await {
            LoopState::Connecting
        } else {
            LoopState::Terminated
        }
    }

    fn log_counters(&mut self) {
        if self.counters.window_start.elapsed() < self.settings.stats_interval {
            return;
        }
        let stats = self.sync.take_stats();
        debug!(
            "Reader {}: fps={} zero_reads={} resyncs={} idx={}",
            self.port,
            stats.frames,
            self.counters.zero_reads,
            stats.resyncs,
            self.sync.cursor()
        );
        self.counters.zero_reads = 0;
        self.counters.window_start = Instant::now();
    }
}
