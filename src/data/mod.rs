//! Log file storage and reading.
//!
//! The raw log is the only hand-off point between acquisition and processing:
//! [`storage`] writes it (plus the simplified log and CSV exports) and
//! [`reader`] recovers the header and body rows in a later pass.
pub mod reader;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker row opening the header block.
pub const HEADER_START: &str = "Header_Start";
/// Marker row closing the header block.
pub const HEADER_END: &str = "Header_End";

/// Time-of-day format used for the leading timestamp of every body row.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.6f";

/// One coerced field from a log row.
///
/// Fields that parse as numbers become [`LogValue::Number`]; everything else
/// (sentence tags, hemisphere letters, checksum suffixes) stays text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogValue {
    Number(f64),
    Text(String),
}

impl LogValue {
    /// Coerce a raw field. Empty fields are absent.
    pub fn parse(raw: &str) -> Option<LogValue> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => LogValue::Number(n),
            _ => LogValue::Text(trimmed.to_string()),
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LogValue::Number(n) => Some(*n),
            LogValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            LogValue::Text(s) => Some(s),
            LogValue::Number(_) => None,
        }
    }
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Number(n) => write!(f, "{}", n),
            LogValue::Text(s) => f.write_str(s),
        }
    }
}
