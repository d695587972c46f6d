//! Length units and presentation-time conversion.
//!
//! Measurements are stored in canonical units: millimetres for girth and
//! centimetres for height. Conversion to display units happens only when
//! rendering and is rounded to two decimal places.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::ParseEnumError;

/// Display precision for converted lengths
pub const DISPLAY_DECIMALS: u32 = 2;

/// Supported length units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Mm,
    Cm,
    Inch,
    #[serde(rename = "m")]
    Meter,
}

impl LengthUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::Inch => "inch",
            LengthUnit::Meter => "m",
        }
    }

    /// Length of one unit in millimetres
    fn millimetres(&self) -> Decimal {
        match self {
            LengthUnit::Mm => Decimal::ONE,
            LengthUnit::Cm => Decimal::TEN,
            LengthUnit::Inch => Decimal::new(254, 1),
            LengthUnit::Meter => Decimal::ONE_THOUSAND,
        }
    }
}

impl FromStr for LengthUnit {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mm" => Ok(LengthUnit::Mm),
            "cm" => Ok(LengthUnit::Cm),
            "inch" | "in" => Ok(LengthUnit::Inch),
            "m" => Ok(LengthUnit::Meter),
            _ => Err(ParseEnumError::new("length unit", s)),
        }
    }
}

impl std::fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Convert a length between units, rounded to display precision
pub fn convert_length(value: Decimal, from: LengthUnit, to: LengthUnit) -> Decimal {
    if from == to {
        return value.round_dp(DISPLAY_DECIMALS);
    }
    (value * from.millimetres() / to.millimetres()).round_dp(DISPLAY_DECIMALS)
}

/// Render a length with its unit symbol, e.g. "2.54 cm"
pub fn format_length(value: Decimal, unit: LengthUnit, precision: u32) -> String {
    let rounded = value.round_dp(precision);
    format!("{:.*} {}", precision as usize, rounded, unit.symbol())
}

/// A predefined measurement bucket in canonical units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRange {
    pub min: Decimal,
    pub max: Decimal,
    pub unit: LengthUnit,
}

impl MeasurementRange {
    fn new(min_tenths: i64, max_tenths: i64, unit: LengthUnit) -> Self {
        Self {
            min: Decimal::new(min_tenths, 1),
            max: Decimal::new(max_tenths, 1),
            unit,
        }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        value >= self.min && value < self.max
    }

    /// Label in the requested display unit, e.g. "0.20 inch - 0.39 inch"
    pub fn label(&self, display: LengthUnit) -> String {
        format!(
            "{} - {}",
            format_length(convert_length(self.min, self.unit, display), display, DISPLAY_DECIMALS),
            format_length(convert_length(self.max, self.unit, display), display, DISPLAY_DECIMALS),
        )
    }
}

/// Girth buckets used by the quick-entry measurement form, millimetres
pub fn girth_ranges() -> Vec<MeasurementRange> {
    [
        (50, 100),
        (100, 150),
        (150, 200),
        (200, 250),
        (250, 300),
        (300, 400),
        (400, 500),
        (500, 750),
        (750, 1000),
        (1000, 9990),
    ]
    .into_iter()
    .map(|(min, max)| MeasurementRange::new(min, max, LengthUnit::Mm))
    .collect()
}

/// Height buckets used by the quick-entry measurement form, centimetres
pub fn height_ranges() -> Vec<MeasurementRange> {
    [
        (50, 100),
        (100, 150),
        (150, 200),
        (200, 250),
        (250, 300),
        (300, 400),
        (400, 500),
        (500, 750),
        (750, 1000),
        (1000, 99990),
    ]
    .into_iter()
    .map(|(min, max)| MeasurementRange::new(min, max, LengthUnit::Cm))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_convert_basic_units() {
        assert_eq!(convert_length(dec("1"), LengthUnit::Cm, LengthUnit::Mm), dec("10"));
        assert_eq!(convert_length(dec("2.54"), LengthUnit::Cm, LengthUnit::Inch), dec("1"));
        assert_eq!(convert_length(dec("1"), LengthUnit::Inch, LengthUnit::Mm), dec("25.4"));
        assert_eq!(convert_length(dec("150"), LengthUnit::Cm, LengthUnit::Meter), dec("1.5"));
        assert_eq!(convert_length(dec("1"), LengthUnit::Cm, LengthUnit::Inch), dec("0.39"));
    }

    #[test]
    fn test_cm_inch_round_trip_known_values() {
        let tolerance = dec("0.01");
        for x in ["0.1", "1", "2.54", "100"] {
            let x = dec(x);
            let inches = convert_length(x, LengthUnit::Cm, LengthUnit::Inch);
            let back = convert_length(inches, LengthUnit::Inch, LengthUnit::Cm);
            assert!((back - x).abs() <= tolerance, "{} -> {} -> {}", x, inches, back);
        }
    }

    #[test]
    fn test_format_length() {
        assert_eq!(format_length(dec("2.5"), LengthUnit::Cm, 2), "2.50 cm");
        assert_eq!(format_length(dec("0.3937"), LengthUnit::Inch, 2), "0.39 inch");
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("inch".parse::<LengthUnit>().unwrap(), LengthUnit::Inch);
        assert_eq!("m".parse::<LengthUnit>().unwrap(), LengthUnit::Meter);
        assert!("ft".parse::<LengthUnit>().is_err());
    }

    #[test]
    fn test_range_labels() {
        let first = &girth_ranges()[0];
        assert_eq!(first.label(LengthUnit::Cm), "0.50 cm - 1.00 cm");
        assert!(first.contains(dec("7.5")));
        assert!(!first.contains(dec("10")));
        assert_eq!(height_ranges()[1].label(LengthUnit::Cm), "10.00 cm - 15.00 cm");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Any metric value with display precision survives a trip through another metric unit
        #[test]
        fn prop_metric_round_trip_exact(hundredths in 1i64..1_000_000) {
            let x = Decimal::new(hundredths, 2);
            let mm = convert_length(x, LengthUnit::Cm, LengthUnit::Mm);
            prop_assert_eq!(convert_length(mm, LengthUnit::Mm, LengthUnit::Cm), x);
        }

        /// cm -> inch -> cm stays within display rounding tolerance
        #[test]
        fn prop_inch_round_trip_within_tolerance(hundredths in 1i64..100_000) {
            let x = Decimal::new(hundredths, 2);
            let inches = convert_length(x, LengthUnit::Cm, LengthUnit::Inch);
            let back = convert_length(inches, LengthUnit::Inch, LengthUnit::Cm);
            // half an inch-hundredth is 0.0127 cm, plus cm rounding
            prop_assert!((back - x).abs() <= dec("0.02"));
        }
    }
}
