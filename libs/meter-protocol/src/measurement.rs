//! Measurement model
//!
//! One [`Measurement`] is produced per accepted frame. It carries both the
//! numeric value (when every digit decoded) and the text as the meter shows
//! it, plus the annunciator flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display text used when at least one digit pattern is not recognized
pub const NON_NUMERIC_PLACEHOLDER: &str = "????";

/// Coupling mode annunciator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "DC")]
    Dc,
    /// Neither AC nor DC lit (also used for temperature)
    #[default]
    #[serde(rename = "")]
    None,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Ac => "AC",
            Mode::Dc => "DC",
            Mode::None => "",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Magnitude prefix annunciator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Nano,
    Micro,
    Milli,
    Kilo,
    Mega,
}

impl Prefix {
    /// Symbol prepended to the base unit
    pub fn symbol(self) -> &'static str {
        match self {
            Prefix::Nano => "n",
            Prefix::Micro => "µ",
            Prefix::Milli => "m",
            Prefix::Kilo => "k",
            Prefix::Mega => "M",
        }
    }

    /// Scale a displayed value into base units
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Prefix::Nano => value / 1e9,
            Prefix::Micro => value / 1e6,
            Prefix::Milli => value / 1e3,
            Prefix::Kilo => value * 1e3,
            Prefix::Mega => value * 1e6,
        }
    }
}

/// Base unit annunciator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseUnit {
    Celsius,
    Percent,
    Farad,
    Ohm,
    Ampere,
    Volt,
    Hertz,
}

impl BaseUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            BaseUnit::Celsius => "°C",
            BaseUnit::Percent => "%",
            BaseUnit::Farad => "F",
            BaseUnit::Ohm => "Ohm",
            BaseUnit::Ampere => "A",
            BaseUnit::Volt => "V",
            BaseUnit::Hertz => "Hz",
        }
    }

    /// Percent and temperature are never shown with a magnitude prefix
    pub fn takes_prefix(self) -> bool {
        !matches!(self, BaseUnit::Celsius | BaseUnit::Percent)
    }

    /// Compose the unit string shown next to the value, e.g. `mV`, `kOhm`
    pub fn with_prefix(self, prefix: Option<Prefix>) -> String {
        match prefix {
            Some(p) if self.takes_prefix() => format!("{}{}", p.symbol(), self.symbol()),
            _ => self.symbol().to_string(),
        }
    }
}

/// One decoded display snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Signed value in base units, `None` when any digit is unreadable
    pub value: Option<f64>,
    /// Display text with the decimal point in place, or the placeholder
    pub value_str: String,
    /// Unit including prefix, empty when no unit annunciator is lit
    pub unit: String,
    pub mode: Mode,
    /// Auto-ranging enabled
    pub auto: bool,
    pub hold: bool,
    /// Relative (delta) measurement
    pub rel: bool,
    pub low_batt: bool,
    /// Source frame as space separated hex, for diagnostics
    #[serde(rename = "raw")]
    pub raw_hex: String,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value_str)?;
        if !self.unit.is_empty() {
            write!(f, " {}", self.unit)?;
        }
        if self.mode != Mode::None {
            write!(f, " {}", self.mode)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_prefix_composition() {
        assert_eq!(BaseUnit::Volt.with_prefix(Some(Prefix::Milli)), "mV");
        assert_eq!(BaseUnit::Farad.with_prefix(Some(Prefix::Micro)), "µF");
        assert_eq!(BaseUnit::Ohm.with_prefix(Some(Prefix::Mega)), "MOhm");
        assert_eq!(BaseUnit::Hertz.with_prefix(None), "Hz");
    }

    #[test]
    fn test_percent_and_celsius_ignore_prefix() {
        assert_eq!(BaseUnit::Percent.with_prefix(Some(Prefix::Kilo)), "%");
        assert_eq!(BaseUnit::Celsius.with_prefix(Some(Prefix::Milli)), "°C");
    }

    #[test]
    fn test_measurement_json_field_names() {
        let m = Measurement {
            value: Some(1.5),
            value_str: "1.500".to_string(),
            unit: "V".to_string(),
            mode: Mode::Dc,
            auto: true,
            hold: false,
            rel: false,
            low_batt: false,
            raw_hex: "10 20".to_string(),
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["value"], 1.5);
        assert_eq!(json["mode"], "DC");
        assert_eq!(json["raw"], "10 20");
        assert_eq!(json["low_batt"], false);

        let none = Measurement {
            value: None,
            mode: Mode::None,
            ..m
        };
        let json = serde_json::to_value(&none).unwrap();
        assert!(json["value"].is_null());
        assert_eq!(json["mode"], "");
    }

    #[test]
    fn test_display() {
        let m = Measurement {
            value: Some(-0.25),
            value_str: "-0.250".to_string(),
            unit: "mA".to_string(),
            mode: Mode::Ac,
            auto: false,
            hold: false,
            rel: false,
            low_batt: false,
            raw_hex: String::new(),
        };
        assert_eq!(m.to_string(), "-0.250 mA AC");
    }
}
