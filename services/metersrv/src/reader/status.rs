//! Link status record and derived connectivity

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Status snapshot returned to callers
///
/// `connected` is computed when the snapshot is taken and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub port: String,
    pub baud: u32,
    pub connected: bool,
    /// Wall-clock time of the last accepted frame, `None` if never
    pub last_frame_at: Option<DateTime<Utc>>,
    /// Last open/read failure, empty when none
    pub last_error: String,
}

#[derive(Debug, Default)]
struct StatusRecord {
    generation: u64,
    port: String,
    baud: u32,
    last_frame: Option<(Instant, DateTime<Utc>)>,
    last_error: String,
}

/// Lock-guarded status record shared by the manager and its reader loop
///
/// Every mutation takes the generation of the loop that produced it; updates
/// from a loop that has since been replaced or stopped are ignored.
#[derive(Debug)]
pub(crate) struct LinkStatus {
    record: Mutex<StatusRecord>,
    stale_after: Duration,
}

impl LinkStatus {
    pub(crate) fn new(stale_after: Duration) -> Self {
        Self {
            record: Mutex::new(StatusRecord::default()),
            stale_after,
        }
    }

    /// Point the record at a new target and return the new generation
    pub(crate) fn retarget(&self, port: &str, baud: u32) -> u64 {
        let mut record = self.record.lock();
        record.generation += 1;
        record.port = port.to_string();
        record.baud = baud;
        record.last_frame = None;
        record.last_error.clear();
        record.generation
    }

    /// Invalidate the running generation without a new target
    pub(crate) fn halt(&self) {
        let mut record = self.record.lock();
        record.generation += 1;
        record.last_frame = None;
    }

    /// Liveness update: stamp the frame time and clear the error
    pub(crate) fn mark_frame(&self, generation: u64) -> bool {
        let mut record = self.record.lock();
        if record.generation != generation {
            return false;
        }
        record.last_frame = Some((Instant::now(), Utc::now()));
        record.last_error.clear();
        true
    }

    pub(crate) fn mark_error(&self, generation: u64, error: String) -> bool {
        let mut record = self.record.lock();
        if record.generation != generation {
            return false;
        }
        record.last_error = error;
        true
    }

    pub(crate) fn snapshot(&self) -> ConnectionStatus {
        let (port, baud, last_frame, last_error) = {
            let record = self.record.lock();
            (
                record.port.clone(),
                record.baud,
                record.last_frame,
                record.last_error.clone(),
            )
        };

        let connected = match last_frame {
            Some((at, _)) => at.elapsed() <= self.stale_after && last_error.is_empty(),
            None => false,
        };

        ConnectionStatus {
            port,
            baud,
            connected,
            last_frame_at: last_frame.map(|(_, wall)| wall),
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_connected_before_first_frame() {
        let status = LinkStatus::new(Duration::from_secs(3));
        status.retarget("/dev/ttyUSB0", 2400);
        let snap = status.snapshot();
        assert!(!snap.connected);
        assert_eq!(snap.last_frame_at, None);
        assert_eq!(snap.port, "/dev/ttyUSB0");
        assert_eq!(snap.baud, 2400);
    }

    #[test]
    fn test_fresh_frame_means_connected() {
        let status = LinkStatus::new(Duration::from_secs(3));
        let generation = status.retarget("COM3", 2400);
        assert!(status.mark_frame(generation));
        let snap = status.snapshot();
        assert!(snap.connected);
        assert!(snap.last_frame_at.is_some());
    }

    #[test]
    fn test_stale_frame_means_disconnected() {
        let status = LinkStatus::new(Duration::from_millis(20));
        let generation = status.retarget("COM3", 2400);
        status.mark_frame(generation);
        std::thread::sleep(Duration::from_millis(40));
        let snap = status.snapshot();
        assert!(!snap.connected);
        assert!(snap.last_frame_at.is_some());
    }

    #[test]
    fn test_error_blocks_connected_until_next_frame() {
        let status = LinkStatus::new(Duration::from_secs(3));
        let generation = status.retarget("COM3", 2400);
        status.mark_frame(generation);
        status.mark_error(generation, "Read error: device disconnected".to_string());
        assert!(!status.snapshot().connected);

        status.mark_frame(generation);
        let snap = status.snapshot();
        assert!(snap.connected);
        assert_eq!(snap.last_error, "");
    }

    #[test]
    fn test_retarget_resets_and_ignores_old_generation() {
        let status = LinkStatus::new(Duration::from_secs(3));
        let old = status.retarget("COM3", 2400);
        status.mark_error(old, "boom".to_string());

        let new = status.retarget("COM4", 9600);
        assert_ne!(old, new);
        let snap = status.snapshot();
        assert_eq!(snap.last_error, "");
        assert_eq!(snap.port, "COM4");

        assert!(!status.mark_frame(old));
        assert!(!status.mark_error(old, "late".to_string()));
        assert!(!status.snapshot().connected);
    }

    #[test]
    fn test_halt_drops_connected() {
        let status = LinkStatus::new(Duration::from_secs(3));
        let generation = status.retarget("COM3", 2400);
        status.mark_frame(generation);
        status.halt();
        assert!(!status.snapshot().connected);
        assert!(!status.mark_frame(generation));
    }
}
