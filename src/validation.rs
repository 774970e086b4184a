//! Small validators shared by the survey metadata and the settings loader.

use std::ops::RangeInclusive;

/// Baud rates the shipboard sensors are known to run at.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates that a name can be used as a bare CSV field and in file names.
///
/// Survey, vessel and sensor names end up in log file names and unquoted header
/// fields, so they may not contain whitespace or commas.
pub fn is_single_token(value: &str) -> Result<(), &'static str> {
    is_not_empty(value)?;
    if value.chars().any(|c| c.is_whitespace() || c == ',') {
        return Err("Value cannot contain spaces or commas");
    }
    Ok(())
}

/// Validates a serial baud rate against the standard list.
pub fn is_valid_baud_rate(baud: u32) -> Result<(), &'static str> {
    if STANDARD_BAUD_RATES.contains(&baud) {
        Ok(())
    } else {
        Err("Baud rate is not a standard serial rate")
    }
}

/// Validates a tracing level name (case insensitive).
pub fn is_valid_log_level(level: &str) -> Result<(), &'static str> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err("Must be one of: trace, debug, info, warn, error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_in_range() {
        assert!(is_in_range(5, 1..=10).is_ok());
        assert!(is_in_range(11, 1..=10).is_err());
        assert!(is_in_range(-0.5, f64::NEG_INFINITY..=0.0).is_ok());
    }

    #[test]
    fn test_is_single_token() {
        assert!(is_single_token("Example_Survey").is_ok());
        assert!(is_single_token("two words").is_err());
        assert!(is_single_token("a,b").is_err());
        assert!(is_single_token("  ").is_err());
    }

    #[test]
    fn test_is_valid_baud_rate() {
        assert!(is_valid_baud_rate(460800).is_ok());
        assert!(is_valid_baud_rate(12345).is_err());
    }

    #[test]
    fn test_is_valid_log_level() {
        assert!(is_valid_log_level("Debug").is_ok());
        assert!(is_valid_log_level("verbose").is_err());
    }
}
