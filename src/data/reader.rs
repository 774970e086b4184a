//! Raw Log Reader
//!
//! Recovers the metadata header and the body rows of a log written by
//! [`crate::data::storage`]. Reading is a single forward pass per section.
//! Body fields are coerced leniently: numbers become [`LogValue::Number`],
//! empty fields become absent and anything else stays text. Rows whose
//! timestamp does not parse are dropped rather than raised.

use crate::data::{LogValue, HEADER_END, HEADER_START};
use crate::error::{AppResult, DaqError};
use crate::metadata::{LogKind, Metadata, METADATA_ROWS};
use crate::nmea::MessageKind;
use chrono::NaiveTime;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

fn csv_reader(path: &Path) -> AppResult<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

/// Rows strictly between the first `start` marker row and the next `end` marker row.
///
/// Rows before `start` are skipped. With `end == None` the section runs to
/// end of file. Reading stops as soon as `end` is seen.
pub fn read_section(path: &Path, start: &str, end: Option<&str>) -> AppResult<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut started = false;
    for record in csv_reader(path)?.records() {
        let record = record?;
        let first = record.get(0).unwrap_or_default();
        if first == start {
            started = true;
        } else if !started {
            continue;
        } else if Some(first) == end {
            return Ok(rows);
        } else {
            rows.push(record.iter().map(str::to_string).collect());
        }
    }
    Ok(rows)
}

/// Everything in a file ahead of the body rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LogHeader {
    pub kind: LogKind,
    pub metadata: Metadata,
    /// Column names (simplified logs only).
    pub columns: Option<Vec<String>>,
}

/// Read the file type tag and metadata header of any log or configuration file.
///
/// # Errors
/// [`DaqError::LogFormat`] when the tag is unknown or a metadata row is missing.
pub fn read_log_header(path: &Path) -> AppResult<LogHeader> {
    let tag = csv_reader(path)?
        .records()
        .next()
        .transpose()?
        .and_then(|r| r.get(0).map(str::to_string))
        .ok_or_else(|| DaqError::LogFormat(format!("'{}' is empty", path.display())))?;
    let kind: LogKind = tag.parse()?;

    let rows = read_section(path, HEADER_START, Some(HEADER_END))?;
    let metadata = Metadata::from_header_rows(&rows)?;
    let columns = match kind {
        LogKind::SimpleLog => rows.get(METADATA_ROWS).cloned(),
        _ => None,
    };
    Ok(LogHeader {
        kind,
        metadata,
        columns,
    })
}

/// Read the survey metadata from a configuration file (or any log header).
pub fn read_config_file(path: &Path) -> AppResult<Metadata> {
    read_log_header(path).map(|h| h.metadata)
}

/// One body row of the raw log.
///
/// Field indices follow the on-disk row: 0 is the timestamp, 1 the message tag,
/// 2.. the fields that followed on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLogRecord {
    pub time: NaiveTime,
    pub kind: MessageKind,
    fields: Vec<Option<LogValue>>,
}

impl RawLogRecord {
    /// Build a record from the raw fields of one row, `None` if the timestamp
    /// or tag is unusable.
    pub fn from_fields(raw: &[String]) -> Option<Self> {
        let time = parse_timestamp(raw.first()?)?;
        let tag = raw.get(1)?.trim();
        if tag.is_empty() {
            return None;
        }
        let mut fields: Vec<Option<LogValue>> = raw.iter().map(|f| LogValue::parse(f)).collect();
        // The tag is never numeric even if it looks like it.
        fields[1] = Some(LogValue::Text(tag.to_string()));
        Some(Self {
            time,
            kind: MessageKind::from_tag(tag),
            fields,
        })
    }

    pub fn tag(&self) -> &str {
        self.fields
            .get(1)
            .and_then(|f| f.as_ref())
            .and_then(LogValue::as_text)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field at a raw index, `None` if absent or past the end.
    pub fn get(&self, index: usize) -> Option<&LogValue> {
        self.fields.get(index).and_then(Option::as_ref)
    }

    /// Field counted from the end of the row (`1` is the last field).
    pub fn from_end(&self, offset: usize) -> Option<&LogValue> {
        let index = self.fields.len().checked_sub(offset)?;
        self.get(index)
    }

    /// Required numeric field.
    pub fn number(&self, index: usize) -> AppResult<f64> {
        self.optional_number(index)?
            .ok_or_else(|| DaqError::conversion(self.field_name(index), ""))
    }

    /// Numeric field that may be absent; text is a conversion error.
    pub fn optional_number(&self, index: usize) -> AppResult<Option<f64>> {
        match self.get(index) {
            None => Ok(None),
            Some(LogValue::Number(n)) => Ok(Some(*n)),
            Some(LogValue::Text(t)) => Err(DaqError::conversion(self.field_name(index), t.clone())),
        }
    }

    /// Required text field.
    pub fn text(&self, index: usize) -> AppResult<String> {
        self.get(index)
            .map(ToString::to_string)
            .ok_or_else(|| DaqError::conversion(self.field_name(index), ""))
    }

    fn field_name(&self, index: usize) -> String {
        format!("{} field {}", self.tag(), index)
    }
}

/// Parse a body-row timestamp (`HH:MM:SS` with optional fraction).
pub fn parse_timestamp(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

/// A fully read raw log.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub header: LogHeader,
    pub records: Vec<RawLogRecord>,
}

/// Read header and body of a raw log.
pub fn read_raw_log(path: &Path) -> AppResult<RawLog> {
    let header = read_log_header(path)?;
    let body = read_section(path, HEADER_END, None)?;

    let total = body.len();
    let records: Vec<RawLogRecord> = body
        .iter()
        .filter_map(|row| {
            let record = RawLogRecord::from_fields(row);
            if record.is_none() {
                debug!(row = ?row, "dropping row without a readable timestamp");
            }
            record
        })
        .collect();

    info!(
        "Read {} rows from '{}' ({} dropped)",
        records.len(),
        path.display(),
        total - records.len()
    );
    Ok(RawLog { header, records })
}
