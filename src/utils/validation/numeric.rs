//! Numeric validation utilities
//!
//! Range checks shared by the configuration constructors and the batch orchestrator.

use crate::error::{BgComposeError, Result};

/// Validator for numeric parameters
pub struct NumericValidator;

impl NumericValidator {
    /// Validate a unit-range value (0.0 to 1.0)
    pub fn validate_percentage(value: f32) -> Result<f32> {
        if !value.is_finite() {
            return Err(BgComposeError::invalid_config(format!(
                "Percentage value must be finite, got {}",
                value
            )));
        }

        if !(0.0..=1.0).contains(&value) {
            return Err(BgComposeError::invalid_config(format!(
                "Percentage value must be between 0.0 and 1.0, got {}",
                value
            )));
        }

        Ok(value)
    }

    /// Validate worker count for batch processing
    pub fn validate_worker_count(value: usize) -> Result<usize> {
        const MAX_WORKERS: usize = 256;

        Self::validate_range(value, 1, MAX_WORKERS, "Worker count")
    }

    /// Validate numeric range (inclusive)
    pub fn validate_range<T>(value: T, min: T, max: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            return Err(BgComposeError::invalid_config(format!(
                "{} must be between {} and {}, got {}",
                name, min, max, value
            )));
        }
        Ok(value)
    }

    /// Validate that a value is positive
    pub fn validate_positive<T>(value: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy + Default,
    {
        if value <= T::default() {
            return Err(BgComposeError::invalid_config(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
        Ok(value)
    }
}
