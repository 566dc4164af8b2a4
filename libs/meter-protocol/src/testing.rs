//! Synthetic frame construction for tests
//!
//! Frames built here carry correct positional tags and only the annunciator
//! bits that were asked for, so decoder and reader tests can describe a
//! display state instead of spelling out hex.

use crate::decoder::{segment_pattern, DecimalPoint};
use crate::frame::{expected_tag, Frame, FRAME_LEN};
use crate::measurement::{BaseUnit, Mode, Prefix};

#[derive(Debug, Clone)]
pub struct FrameBuilder {
    segments: [u8; 4],
    point: DecimalPoint,
    negative: bool,
    mode: Mode,
    auto: bool,
    prefixes: Vec<Prefix>,
    units: Vec<BaseUnit>,
    rel: bool,
    hold: bool,
    low_batt: bool,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder {
    /// Blank display: tags only, no segments lit
    pub fn new() -> Self {
        Self {
            segments: [0; 4],
            point: DecimalPoint::None,
            negative: false,
            mode: Mode::None,
            auto: false,
            prefixes: Vec::new(),
            units: Vec::new(),
            rel: false,
            hold: false,
            low_batt: false,
        }
    }

    /// Display four decimal digits (values above 9 are treated as 9)
    pub fn digits(mut self, digits: [u8; 4]) -> Self {
        for (slot, d) in self.segments.iter_mut().zip(digits) {
            *slot = segment_pattern(d.min(9)).unwrap_or(0);
        }
        self
    }

    /// Put an arbitrary 7-bit segment pattern into one digit position
    pub fn raw_digit(mut self, index: usize, pattern: u8) -> Self {
        self.segments[index] = pattern & 0x7F;
        self
    }

    pub fn decimal(mut self, point: DecimalPoint) -> Self {
        self.point = point;
        self
    }

    pub fn negative(mut self) -> Self {
        self.negative = true;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn auto_range(mut self) -> Self {
        self.auto = true;
        self
    }

    /// Light a prefix annunciator; may be called more than once
    pub fn prefix(mut self, prefix: Prefix) -> Self {
        self.prefixes.push(prefix);
        self
    }

    /// Light a unit annunciator; may be called more than once
    pub fn unit(mut self, unit: BaseUnit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn rel(mut self) -> Self {
        self.rel = true;
        self
    }

    pub fn hold(mut self) -> Self {
        self.hold = true;
        self
    }

    pub fn low_battery(mut self) -> Self {
        self.low_batt = true;
        self
    }

    pub fn build(&self) -> Frame {
        let mut frame: Frame = [0; FRAME_LEN];
        for (i, b) in frame.iter_mut().enumerate() {
            *b = expected_tag(i);
        }

        match self.mode {
            Mode::Ac => frame[0] |= 1 << 3,
            Mode::Dc => frame[0] |= 1 << 2,
            Mode::None => {},
        }
        if self.auto {
            frame[0] |= 1 << 1;
        }

        for (i, pattern) in self.segments.iter().enumerate() {
            frame[1 + 2 * i] |= pattern >> 4;
            frame[2 + 2 * i] |= pattern & 0x0F;
        }
        if self.negative {
            frame[1] |= 1 << 3;
        }
        match self.point {
            DecimalPoint::Thousandths => frame[3] |= 1 << 3,
            DecimalPoint::Hundredths => frame[5] |= 1 << 3,
            DecimalPoint::Tenths => frame[7] |= 1 << 3,
            DecimalPoint::None => {},
        }

        for prefix in &self.prefixes {
            match prefix {
                Prefix::Nano => frame[9] |= 1 << 2,
                Prefix::Micro => frame[9] |= 1 << 3,
                Prefix::Kilo => frame[9] |= 1 << 1,
                Prefix::Milli => frame[10] |= 1 << 3,
                Prefix::Mega => frame[10] |= 1 << 1,
            }
        }
        for unit in &self.units {
            match unit {
                BaseUnit::Celsius => frame[13] |= 1 << 2,
                BaseUnit::Percent => frame[10] |= 1 << 2,
                BaseUnit::Farad => frame[11] |= 1 << 3,
                BaseUnit::Ohm => frame[11] |= 1 << 2,
                BaseUnit::Ampere => frame[12] |= 1 << 3,
                BaseUnit::Volt => frame[12] |= 1 << 2,
                BaseUnit::Hertz => frame[12] |= 1 << 1,
            }
        }

        if self.rel {
            frame[11] |= 1 << 1;
        }
        if self.hold {
            frame[11] |= 1;
        }
        if self.low_batt {
            frame[12] |= 1;
        }
        frame
    }
}
