//! WebAssembly module for the Plant Nursery Management Platform
//!
//! Provides client-side helpers for:
//! - Length unit conversion and formatting
//! - Pathway step navigation
//! - Batch number previews
//! - Offline form validation

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use shared::{BatchStage, LengthUnit, Pathway, StageGraph};
use wasm_bindgen::prelude::*;

fn to_decimal(value: f64) -> Result<Decimal, String> {
    Decimal::try_from(value).map_err(|_| format!("{} is not a finite number", value))
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn parse<T: std::str::FromStr>(value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| e.to_string())
}

fn js_error(message: String) -> JsValue {
    JsValue::from_str(&message)
}

fn strings_to_array(values: Vec<String>) -> js_sys::Array {
    values.into_iter().map(JsValue::from).collect()
}

// ============================================================================
// Units
// ============================================================================

fn convert(value: f64, from: &str, to: &str) -> Result<f64, String> {
    let converted = shared::convert_length(to_decimal(value)?, parse(from)?, parse(to)?);
    Ok(to_f64(converted))
}

fn format_value(value: f64, unit: &str, precision: u32) -> Result<String, String> {
    Ok(shared::format_length(
        to_decimal(value)?,
        parse::<LengthUnit>(unit)?,
        precision,
    ))
}

fn range_labels(kind: &str, unit: &str) -> Result<Vec<String>, String> {
    let display = parse::<LengthUnit>(unit)?;
    let ranges = match kind {
        "girth" => shared::girth_ranges(),
        "height" => shared::height_ranges(),
        other => return Err(format!("unknown measurement kind: {}", other)),
    };
    Ok(ranges.iter().map(|range| range.label(display)).collect())
}

/// Convert a length between "mm", "cm", "inch" and "m", rounded to 2 places
#[wasm_bindgen]
pub fn convert_length(value: f64, from: &str, to: &str) -> Result<f64, JsValue> {
    convert(value, from, to).map_err(js_error)
}

/// Render a length with its unit symbol
#[wasm_bindgen]
pub fn format_length(value: f64, unit: &str, precision: u32) -> Result<String, JsValue> {
    format_value(value, unit, precision).map_err(js_error)
}

/// Labels of the girth or height filter buckets in a display unit
#[wasm_bindgen]
pub fn measurement_range_labels(kind: &str, unit: &str) -> Result<js_sys::Array, JsValue> {
    range_labels(kind, unit)
        .map(strings_to_array)
        .map_err(js_error)
}

// ============================================================================
// Batches
// ============================================================================

fn next_stage_names(pathway: &str, stage: &str) -> Result<Vec<String>, String> {
    let pathway = parse::<Pathway>(pathway)?;
    let stage = parse::<BatchStage>(stage)?;
    Ok(StageGraph::standard()
        .next_stages(pathway, stage)
        .into_iter()
        .map(|stage| stage.as_str().to_string())
        .collect())
}

fn batch_number(
    pathway: &str,
    year: i32,
    month: u32,
    day: u32,
    sequence: u32,
) -> Result<String, String> {
    let pathway = parse::<Pathway>(pathway)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("invalid date {}-{}-{}", year, month, day))?;
    Ok(shared::generate_batch_number(pathway, date, sequence))
}

/// Stages a batch may move to next, e.g. `allowed_next_stages("PURCHASING", "GROWING")`
#[wasm_bindgen]
pub fn allowed_next_stages(pathway: &str, stage: &str) -> Result<js_sys::Array, JsValue> {
    next_stage_names(pathway, stage)
        .map(strings_to_array)
        .map_err(js_error)
}

/// Preview the number a batch created on the given date would receive
#[wasm_bindgen]
pub fn preview_batch_number(
    pathway: &str,
    year: i32,
    month: u32,
    day: u32,
    sequence: u32,
) -> Result<String, JsValue> {
    batch_number(pathway, year, month, day, sequence).map_err(js_error)
}

/// Occupied share of a zone or bed as a percentage
#[wasm_bindgen]
pub fn utilization_percent(capacity: i32, occupied: i32) -> f64 {
    to_f64(shared::utilization_percent(capacity, occupied))
}

// ============================================================================
// Form validation
// ============================================================================

/// First problem with a batch form, or `None` when it can be submitted
#[wasm_bindgen]
pub fn validate_batch_form(initial_qty: i32, custom_name: Option<String>) -> Option<String> {
    shared::validate_initial_qty(initial_qty, 1, 10_000)
        .and_then(|_| shared::validate_custom_name(custom_name.as_deref()))
        .err()
        .map(str::to_string)
}

/// First problem with a measurement form, or `None` when it can be submitted
#[wasm_bindgen]
pub fn validate_measurement_form(
    girth_mm: f64,
    height_cm: f64,
    sample_size: i32,
    current_qty: i32,
    notes: Option<String>,
) -> Option<String> {
    let girth = match to_decimal(girth_mm) {
        Ok(value) => value,
        Err(message) => return Some(message),
    };
    let height = match to_decimal(height_cm) {
        Ok(value) => value,
        Err(message) => return Some(message),
    };
    shared::validate_girth_mm(girth)
        .and_then(|_| shared::validate_height_cm(height))
        .and_then(|_| shared::validate_sample_size(sample_size, current_qty, 100))
        .and_then(|_| shared::validate_notes(notes.as_deref()))
        .err()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_cm_to_inch_and_back() {
        let inches = convert(2.54, "cm", "inch").unwrap();
        assert!((inches - 1.0).abs() < 0.001);
        let back = convert(inches, "in", "cm").unwrap();
        assert!((back - 2.54).abs() < 0.01);
        assert!(convert(1.0, "cm", "furlong").is_err());
    }

    #[test]
    fn test_format_length() {
        assert_eq!(format_value(12.345, "mm", 1).unwrap(), "12.3 mm");
    }

    #[test]
    fn test_next_stage_names() {
        assert_eq!(
            next_stage_names("PURCHASING", "GROWING").unwrap(),
            vec!["HARDENING".to_string()]
        );
        assert!(next_stage_names("PURCHASING", "PHYTOSANITARY")
            .unwrap()
            .is_empty());
        assert!(next_stage_names("GRAFTING", "INITIAL").is_err());
    }

    #[test]
    fn test_batch_number_preview() {
        assert_eq!(
            batch_number("OUT_SOURCING", 2024, 10, 18, 7).unwrap(),
            "OUT-241018-0007"
        );
        assert!(batch_number("OUT_SOURCING", 2024, 2, 30, 1).is_err());
    }

    #[test]
    fn test_range_labels() {
        let labels = range_labels("girth", "mm").unwrap();
        assert!(!labels.is_empty());
        assert!(range_labels("width", "mm").is_err());
    }

    #[test]
    fn test_form_validation() {
        assert_eq!(validate_batch_form(100, None), None);
        assert!(validate_batch_form(0, None).is_some());
        assert!(validate_batch_form(10, Some("x".repeat(101))).is_some());

        assert_eq!(validate_measurement_form(12.5, 60.0, 10, 50, None), None);
        assert!(validate_measurement_form(12.5, 60.0, 60, 50, None).is_some());
        assert!(validate_measurement_form(0.0, 60.0, 10, 50, None).is_some());
    }

    #[test]
    fn test_utilization_percent() {
        assert!((utilization_percent(900, 850) - 94.4).abs() < 0.001);
        assert_eq!(utilization_percent(0, 0), 0.0);
    }
}
