//! DOP Extractor
//!
//! One [`DopSample`] per run of consecutive GSA rows, taken from the first row
//! of the run.

use crate::data::reader::RawLogRecord;
use crate::data::LogValue;
use crate::nmea::MessageKind;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Dilution-of-precision sample. Fields that are not numeric are left absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DopSample {
    /// Time of the GSA row.
    pub time: NaiveTime,
    /// Tag of the source row, e.g. `$GNGSA`.
    pub message_kind: String,
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
}

impl DopSample {
    /// Values sit at fixed offsets from the end of the row.
    fn from_record(record: &RawLogRecord) -> Self {
        let tail = |offset| record.from_end(offset).and_then(LogValue::as_f64);
        Self {
            time: record.time,
            message_kind: record.tag().to_string(),
            pdop: tail(2),
            hdop: tail(3),
            vdop: tail(4),
        }
    }
}

/// Rising-edge GSA detection over a row stream.
pub fn extract_dops(records: &[RawLogRecord]) -> Vec<DopSample> {
    let mut previous: Option<MessageKind> = None;
    let mut samples = Vec::new();
    for record in records {
        if record.kind == MessageKind::Gsa && previous != Some(MessageKind::Gsa) {
            samples.push(DopSample::from_record(record));
        }
        previous = Some(record.kind);
    }
    info!("Extracted {} DOP samples", samples.len());
    samples
}
