//! Single-slot holder for the most recent measurement

use std::sync::Arc;

use meter_protocol::Measurement;
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    value: Option<Arc<Measurement>>,
}

/// Last-write-wins buffer shared between the reader loop and API readers
///
/// Writes from a reader loop are tagged with the generation it was started
/// under. [`LatestValue::advance`] moves the buffer to a new generation, after
/// which writes carrying an older one are dropped, so a superseded loop can
/// never overwrite a value produced by its replacement.
#[derive(Debug, Default)]
pub struct LatestValue {
    slot: RwLock<Slot>,
}

impl LatestValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value unconditionally
    pub fn set(&self, measurement: Measurement) {
        self.slot.write().value = Some(Arc::new(measurement));
    }

    /// Replace the value if `generation` is still current, then hand it to
    /// `deliver` before the slot is released
    ///
    /// [`LatestValue::advance`] waits for `deliver` to return, so whatever a
    /// superseded writer delivers lands before its replacement's first value.
    pub fn publish<F>(&self, generation: u64, measurement: Arc<Measurement>, deliver: F) -> bool
    where
        F: FnOnce(&Measurement),
    {
        let mut slot = self.slot.write();
        if slot.generation != generation {
            return false;
        }
        slot.value = Some(measurement.clone());
        deliver(&measurement);
        true
    }

    pub fn get(&self) -> Option<Arc<Measurement>> {
        self.slot.read().value.clone()
    }

    pub fn clear(&self) {
        self.slot.write().value = None;
    }

    /// Start a new writer generation and return it
    pub fn advance(&self) -> u64 {
        let mut slot = self.slot.write();
        slot.generation += 1;
        slot.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_protocol::testing::FrameBuilder;
    use meter_protocol::{decode_frame, BaseUnit, DecimalPoint, Mode};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn sample(digits: [u8; 4]) -> Measurement {
        decode_frame(
            &FrameBuilder::new()
                .digits(digits)
                .decimal(DecimalPoint::Tenths)
                .mode(Mode::Dc)
                .unit(BaseUnit::Volt)
                .build(),
        )
    }

    #[test]
    fn test_empty_until_set() {
        let latest = LatestValue::new();
        assert!(latest.get().is_none());
        latest.set(sample([1, 2, 3, 4]));
        assert_eq!(latest.get().unwrap().value_str, "123.4");
        latest.clear();
        assert!(latest.get().is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let latest = LatestValue::new();
        latest.set(sample([1, 1, 1, 1]));
        latest.set(sample([2, 2, 2, 2]));
        assert_eq!(latest.get().unwrap().value_str, "222.2");
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let latest = LatestValue::new();
        let old = latest.advance();
        assert!(latest.publish(old, Arc::new(sample([1, 1, 1, 1])), |_| {}));

        let current = latest.advance();
        assert!(!latest.publish(old, Arc::new(sample([9, 9, 9, 9])), |_| {}));
        assert_eq!(latest.get().unwrap().value_str, "111.1");

        assert!(latest.publish(current, Arc::new(sample([5, 5, 5, 5])), |_| {}));
        assert_eq!(latest.get().unwrap().value_str, "555.5");
    }

    #[test]
    fn test_rejected_publish_is_not_delivered() {
        let latest = LatestValue::new();
        let old = latest.advance();
        latest.advance();

        let mut delivered = false;
        assert!(!latest.publish(old, Arc::new(sample([1, 1, 1, 1])), |_| delivered = true));
        assert!(!delivered);
        assert!(latest.get().is_none());
    }

    #[test]
    fn test_advance_waits_for_delivery_in_flight() {
        let latest = Arc::new(LatestValue::new());
        let old = latest.advance();
        let delivered = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();

        let writer = {
            let latest = latest.clone();
            let delivered = delivered.clone();
            std::thread::spawn(move || {
                latest.publish(old, Arc::new(sample([1, 1, 1, 1])), |_| {
                    entered_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(50));
                    delivered.store(true, Ordering::SeqCst);
                })
            })
        };

        entered_rx.recv().unwrap();
        let current = latest.advance();
        // The old writer's delivery finished before the generation moved on
        assert!(delivered.load(Ordering::SeqCst));
        assert!(writer.join().unwrap());
        assert!(!latest.publish(old, Arc::new(sample([2, 2, 2, 2])), |_| {}));
        assert!(latest.publish(current, Arc::new(sample([3, 3, 3, 3])), |_| {}));
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let latest = Arc::new(LatestValue::new());
        let generation = latest.advance();

        let writer = {
            let latest = latest.clone();
            std::thread::spawn(move || {
                for d in 0..10u8 {
                    latest.publish(generation, Arc::new(sample([d, d, d, d])), |_| {});
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let latest = latest.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if let Some(m) = latest.get() {
                            assert_eq!(m.unit, "V");
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(latest.get().unwrap().value_str, "999.9");
    }
}
