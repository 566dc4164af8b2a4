//! Frame decoder
//!
//! Bit layout of a frame (bit 0 = least significant, high nibble is the tag):
//!
//! ```text
//! byte  bit3      bit2      bit1      bit0
//!  0    AC        DC        AUTO      -
//!  1    sign      digit1 segments (high)
//!  2    digit1 segments (low)
//!  3    DP 1.000  digit2 segments (high)
//!  4    digit2 segments (low)
//!  5    DP 10.00  digit3 segments (high)
//!  6    digit3 segments (low)
//!  7    DP 100.0  digit4 segments (high)
//!  8    digit4 segments (low)
//!  9    micro     nano      kilo      -
//! 10    milli     percent   mega      -
//! 11    farad     ohm       rel       hold
//! 12    ampere    volt      hertz     low battery
//! 13    -         celsius   -         -
//! ```

use crate::error::{ProtocolError, Result};
use crate::frame::{validate_tags, Frame, FRAME_LEN};
use crate::measurement::{BaseUnit, Measurement, Mode, Prefix, NON_NUMERIC_PLACEHOLDER};

/// 7-segment pattern (bit 7 masked) to digit
const SEGMENT_DIGITS: [(u8, u8); 10] = [
    (0x7D, 0),
    (0x05, 1),
    (0x5B, 2),
    (0x1F, 3),
    (0x27, 4),
    (0x3E, 5),
    (0x7E, 6),
    (0x15, 7),
    (0x7F, 8),
    (0x3F, 9),
];

const DIGIT_COUNT: usize = 4;

/// Position of the lit decimal point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalPoint {
    /// `1234`
    None,
    /// `1.234`
    Thousandths,
    /// `12.34`
    Hundredths,
    /// `123.4`
    Tenths,
}

impl DecimalPoint {
    pub fn divisor(self) -> f64 {
        match self {
            DecimalPoint::None => 1.0,
            DecimalPoint::Thousandths => 1000.0,
            DecimalPoint::Hundredths => 100.0,
            DecimalPoint::Tenths => 10.0,
        }
    }

    /// Digits shown before the point
    fn integer_digits(self) -> usize {
        match self {
            DecimalPoint::None => DIGIT_COUNT,
            DecimalPoint::Thousandths => 1,
            DecimalPoint::Hundredths => 2,
            DecimalPoint::Tenths => 3,
        }
    }
}

#[inline]
const fn bit(byte: u8, n: u8) -> bool {
    byte & (1 << n) != 0
}

fn segment_to_digit(pattern: u8) -> Option<u8> {
    SEGMENT_DIGITS
        .iter()
        .find(|(p, _)| *p == pattern)
        .map(|(_, d)| *d)
}

/// Segment pattern for a decimal digit (inverse of the decode table)
pub fn segment_pattern(digit: u8) -> Option<u8> {
    SEGMENT_DIGITS
        .iter()
        .find(|(_, d)| *d == digit)
        .map(|(p, _)| *p)
}

/// Digit `index` is split over bytes `1 + 2*index` (high) and `2 + 2*index` (low)
fn digit_at(frame: &Frame, index: usize) -> Option<u8> {
    let hi = frame[1 + 2 * index] & 0x0F;
    let lo = frame[2 + 2 * index] & 0x0F;
    segment_to_digit(((hi << 4) | lo) & 0x7F)
}

fn decimal_point(frame: &Frame) -> DecimalPoint {
    if bit(frame[3], 3) {
        DecimalPoint::Thousandths
    } else if bit(frame[5], 3) {
        DecimalPoint::Hundredths
    } else if bit(frame[7], 3) {
        DecimalPoint::Tenths
    } else {
        DecimalPoint::None
    }
}

/// At most one prefix applies, smallest magnitude wins
fn prefix(frame: &Frame) -> Option<Prefix> {
    if bit(frame[9], 2) {
        Some(Prefix::Nano)
    } else if bit(frame[9], 3) {
        Some(Prefix::Micro)
    } else if bit(frame[10], 3) {
        Some(Prefix::Milli)
    } else if bit(frame[9], 1) {
        Some(Prefix::Kilo)
    } else if bit(frame[10], 1) {
        Some(Prefix::Mega)
    } else {
        None
    }
}

// Unit flags are not known to be mutually exclusive; first match wins.
fn base_unit(frame: &Frame) -> Option<BaseUnit> {
    if bit(frame[13], 2) {
        Some(BaseUnit::Celsius)
    } else if bit(frame[10], 2) {
        Some(BaseUnit::Percent)
    } else if bit(frame[11], 3) {
        Some(BaseUnit::Farad)
    } else if bit(frame[11], 2) {
        Some(BaseUnit::Ohm)
    } else if bit(frame[12], 3) {
        Some(BaseUnit::Ampere)
    } else if bit(frame[12], 2) {
        Some(BaseUnit::Volt)
    } else if bit(frame[12], 1) {
        Some(BaseUnit::Hertz)
    } else {
        None
    }
}

fn display_text(digits: &[u8], point: DecimalPoint, negative: bool) -> String {
    let mut text = String::with_capacity(DIGIT_COUNT + 2);
    if negative {
        text.push('-');
    }
    for (i, d) in digits.iter().enumerate() {
        if point != DecimalPoint::None && i == point.integer_digits() {
            text.push('.');
        }
        text.push(char::from(b'0' + d));
    }
    text
}

fn raw_hex(frame: &Frame) -> String {
    frame
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode one tag-checked frame
pub fn decode_frame(frame: &Frame) -> Measurement {
    let negative = bit(frame[1], 3);
    let point = decimal_point(frame);
    let prefix = prefix(frame);
    let base = base_unit(frame);

    let mode = match base {
        Some(BaseUnit::Celsius) => Mode::None,
        _ if bit(frame[0], 3) => Mode::Ac,
        _ if bit(frame[0], 2) => Mode::Dc,
        _ => Mode::None,
    };

    let digits: Option<Vec<u8>> = (0..DIGIT_COUNT).map(|i| digit_at(frame, i)).collect();
    let (value, value_str) = match digits {
        Some(digits) => {
            let magnitude = digits.iter().fold(0u32, |acc, &d| acc * 10 + u32::from(d));
            let mut value = f64::from(magnitude) / point.divisor();
            if negative {
                value = -value;
            }
            if let Some(p) = prefix {
                value = p.apply(value);
            }
            (Some(value), display_text(&digits, point, negative))
        },
        None => (None, NON_NUMERIC_PLACEHOLDER.to_string()),
    };

    Measurement {
        value,
        value_str,
        unit: base.map(|b| b.with_prefix(prefix)).unwrap_or_default(),
        mode,
        auto: bit(frame[0], 1),
        hold: bit(frame[11], 0),
        rel: bit(frame[11], 1),
        low_batt: bit(frame[12], 0),
        raw_hex: raw_hex(frame),
    }
}

/// Decode an arbitrary slice, checking its length and positional tags first
pub fn decode(bytes: &[u8]) -> Result<Measurement> {
    let frame: &Frame = bytes
        .try_into()
        .map_err(|_| ProtocolError::InvalidLength {
            expected: FRAME_LEN,
            actual: bytes.len(),
        })?;
    validate_tags(frame)?;
    Ok(decode_frame(frame))
}
