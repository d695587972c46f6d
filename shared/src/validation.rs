//! Validation utilities for nursery inputs
//!
//! Shared between the backend and offline clients so both reject the same
//! inputs before anything is persisted.

use rust_decimal::Decimal;

/// Smallest accepted average girth, millimetres
pub const MIN_GIRTH_MM: Decimal = Decimal::from_parts(1, 0, 0, false, 1);
/// Largest accepted average girth, millimetres
pub const MAX_GIRTH_MM: Decimal = Decimal::ONE_HUNDRED;
/// Smallest accepted average height, centimetres
pub const MIN_HEIGHT_CM: Decimal = Decimal::ONE;
/// Largest accepted average height, centimetres
pub const MAX_HEIGHT_CM: Decimal = Decimal::ONE_THOUSAND;

pub const MAX_CUSTOM_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 500;

// ============================================================================
// Batch Validations
// ============================================================================

/// Validate the starting plant count of a new batch
pub fn validate_initial_qty(qty: i32, min: i32, max: i32) -> Result<(), &'static str> {
    if qty < 1 {
        return Err("Initial quantity must be a positive integer");
    }
    if qty < min || qty > max {
        return Err("Initial quantity is outside the allowed range");
    }
    Ok(())
}

/// Validate the plant count moved by a stage transition
pub fn validate_transition_qty(qty: i32, current_qty: i32) -> Result<(), &'static str> {
    if qty < 1 {
        return Err("Transition quantity must be at least 1");
    }
    if qty > current_qty {
        return Err("Transition quantity cannot exceed the living plant count");
    }
    Ok(())
}

/// Validate a loss against what the batch still has to lose
pub fn validate_loss_qty(qty: i32, remaining_allowance: i32) -> Result<(), &'static str> {
    if qty < 1 {
        return Err("Loss quantity must be a positive integer");
    }
    if qty > remaining_allowance {
        return Err("Cumulative loss cannot exceed the initial quantity");
    }
    Ok(())
}

/// Validate an optional display name for a batch
pub fn validate_custom_name(name: Option<&str>) -> Result<(), &'static str> {
    match name {
        Some(name) if name.chars().count() > MAX_CUSTOM_NAME_LEN => {
            Err("Custom name must be at most 100 characters")
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Measurement Validations
// ============================================================================

/// Validate an average girth reading in millimetres
pub fn validate_girth_mm(girth: Decimal) -> Result<(), &'static str> {
    if girth < MIN_GIRTH_MM || girth > MAX_GIRTH_MM {
        return Err("Girth must be between 0.1 and 100 mm");
    }
    Ok(())
}

/// Validate an average height reading in centimetres
pub fn validate_height_cm(height: Decimal) -> Result<(), &'static str> {
    if height < MIN_HEIGHT_CM || height > MAX_HEIGHT_CM {
        return Err("Height must be between 1 and 1000 cm");
    }
    Ok(())
}

/// Validate how many plants were sampled
pub fn validate_sample_size(
    sample_size: i32,
    current_qty: i32,
    max_sample_size: i32,
) -> Result<(), &'static str> {
    if sample_size < 1 {
        return Err("Sample size must be at least 1");
    }
    if sample_size > max_sample_size {
        return Err("Sample size exceeds the configured maximum");
    }
    if sample_size > current_qty {
        return Err("Sample size cannot exceed the living plant count");
    }
    Ok(())
}

/// Validate free-text notes
pub fn validate_notes(notes: Option<&str>) -> Result<(), &'static str> {
    match notes {
        Some(notes) if notes.chars().count() > MAX_NOTES_LEN => {
            Err("Notes must be at most 500 characters")
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Reference Data Validations
// ============================================================================

/// Validate a species common name (2-100 characters)
pub fn validate_species_name(name: &str) -> Result<(), &'static str> {
    let len = name.trim().chars().count();
    if len < 2 {
        return Err("Species name must be at least 2 characters");
    }
    if len > 100 {
        return Err("Species name must be at most 100 characters");
    }
    Ok(())
}

/// Validate the readiness targets of a species
pub fn validate_species_targets(girth_mm: Decimal, height_cm: Decimal) -> Result<(), &'static str> {
    validate_girth_mm(girth_mm).map_err(|_| "Target girth must be between 0.1 and 100 mm")?;
    validate_height_cm(height_cm).map_err(|_| "Target height must be between 1 and 1000 cm")?;
    Ok(())
}

/// Validate a zone or bed capacity
pub fn validate_capacity(capacity: i32) -> Result<(), &'static str> {
    if capacity < 1 {
        return Err("Capacity must be at least 1");
    }
    Ok(())
}

/// Validate a zone or bed name
pub fn validate_location_name(name: &str) -> Result<(), &'static str> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err("Name is required");
    }
    if len > 100 {
        return Err("Name must be at most 100 characters");
    }
    Ok(())
}
