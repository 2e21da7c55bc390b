//! Dew point computation.
//!
//! Uses the Magnus-Tetens approximation with the Alduchov-Eskridge
//! coefficients:
//!
//! ```text
//! Td = b * (ln(RH/100) + a*T/(b+T)) / (a - ln(RH/100) - a*T/(b+T))
//! ```
//!
//! Results are returned unrounded; rounding happens when values are
//! serialized (see [`dewdrop_types::round2`]).

use crate::error::{Error, Result};

/// Magnus coefficient `a` (dimensionless).
pub const MAGNUS_A: f64 = 17.625;
/// Magnus coefficient `b` in degrees Celsius.
pub const MAGNUS_B: f64 = 243.04;
/// Absolute zero in degrees Celsius.
pub const ABSOLUTE_ZERO_C: f64 = -273.15;

/// Compute the dew point in degrees Celsius.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if either input is NaN or infinite, the
/// temperature is below absolute zero, or the humidity is outside `0..=100`.
/// Returns [`Error::Computation`] if the formula does not produce a finite
/// result (for example `RH = 0`, where `ln(0)` diverges).
///
/// # Example
///
/// ```
/// use dewdrop_core::dewpoint;
///
/// let td = dewpoint::compute(20.0, 60.0).unwrap();
/// assert!((td - 11.99).abs() < 0.01);
/// ```
pub fn compute(temperature: f64, humidity: f64) -> Result<f64> {
    if temperature.is_nan() || humidity.is_nan() {
        return Err(Error::InvalidInput("input values must not be NaN".into()));
    }
    if temperature.is_infinite() || humidity.is_infinite() {
        return Err(Error::InvalidInput(
            "input values must not be infinite".into(),
        ));
    }
    if temperature < ABSOLUTE_ZERO_C {
        return Err(Error::InvalidInput(format!(
            "temperature {} must be greater than or equal to {}",
            temperature, ABSOLUTE_ZERO_C
        )));
    }
    if !(0.0..=100.0).contains(&humidity) {
        return Err(Error::InvalidInput(format!(
            "relative humidity {} must be between 0 and 100",
            humidity
        )));
    }

    let gamma = (humidity / 100.0).ln() + (MAGNUS_A * temperature) / (MAGNUS_B + temperature);
    let dew_point = (MAGNUS_B * gamma) / (MAGNUS_A - gamma);

    if !dew_point.is_finite() {
        return Err(Error::Computation(format!(
            "dew point for T={} RH={} is {}",
            temperature, humidity, dew_point
        )));
    }
    Ok(dew_point)
}
