//! Log file writers.
//!
//! Every file starts with the metadata header block:
//!
//! ```text
//! OSP_RAW_LOG
//! Header_Start
//! <nine metadata rows>
//! [column row, simplified logs only]
//! Header_End
//! ```
//!
//! Body rows are appended by the acquisition loop and flushed one at a time so
//! an interrupted survey loses at most the row being written.

use crate::data::{HEADER_END, HEADER_START, TIMESTAMP_FORMAT};
use crate::error::AppResult;
use crate::hardware::ping1d::DistanceReport;
use crate::metadata::{LogKind, Metadata};
use crate::nmea::{NmeaSentence, DEPTH_TAG};
use chrono::NaiveTime;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

/// Column row of the simplified log.
pub const SIMPLE_COLUMNS: [&str; 6] = [
    "Time",
    "Latitude",
    "Longitude",
    "Depth_Below_Water",
    "Height_Ellipsoidal",
    "Soundspeed",
];

/// `<survey>_raw_<HHMMSS>.csv` or `<survey>_simple_<HHMMSS>.csv`.
pub fn log_file_name(survey: &str, kind: LogKind, started: NaiveTime) -> String {
    let label = match kind {
        LogKind::RawLog => "raw",
        LogKind::SimpleLog => "simple",
        LogKind::Config => "config",
    };
    format!("{}_{}_{}.csv", survey, label, started.format("%H%M%S"))
}

/// Row timestamp as `HH:MM:SS.ffffff`.
pub fn format_timestamp(time: NaiveTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

fn csv_writer(file: File) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_writer(file)
}

/// Write a fresh file holding only the header block.
pub fn write_meta_header(path: &Path, kind: LogKind, metadata: &Metadata) -> AppResult<()> {
    LogWriter::create(path, kind, metadata).map(|_| ())
}

fn write_header_rows(
    writer: &mut csv::Writer<File>,
    kind: LogKind,
    metadata: &Metadata,
) -> AppResult<()> {
    writer.write_record([kind.tag()])?;
    writer.write_record([HEADER_START])?;
    for row in metadata.to_header_rows() {
        writer.write_record(&row)?;
    }
    if kind == LogKind::SimpleLog {
        writer.write_record(SIMPLE_COLUMNS)?;
    }
    writer.write_record([HEADER_END])?;
    Ok(())
}

/// Append-only log with a metadata header.
pub struct LogWriter {
    path: PathBuf,
    kind: LogKind,
    writer: csv::Writer<File>,
    rows: u64,
}

impl LogWriter {
    /// Create the file, write the header and keep it open for body rows.
    pub fn create(path: impl Into<PathBuf>, kind: LogKind, metadata: &Metadata) -> AppResult<Self> {
        let path = path.into();
        let mut writer = csv_writer(File::create(&path)?);
        write_header_rows(&mut writer, kind, metadata)?;
        writer.flush()?;
        info!("{} file created at '{}'", kind, path.display());
        Ok(Self {
            path,
            kind,
            writer,
            rows: 0,
        })
    }

    /// Create `<dir>/<survey>_<kind>_<HHMMSS>.csv`, making `dir` if needed.
    pub fn create_in(
        dir: &Path,
        kind: LogKind,
        metadata: &Metadata,
        started: NaiveTime,
    ) -> AppResult<Self> {
        std::fs::create_dir_all(dir)?;
        let name = log_file_name(&metadata.survey.name, kind, started);
        Self::create(dir.join(name), kind, metadata)
    }

    /// Append one row and flush it.
    pub fn write_row<I, S>(&mut self, row: I) -> AppResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.writer.write_record(row)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header tag of this log.
    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Body rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush buffered rows to disk.
    pub fn flush(&mut self) -> AppResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// Body rows
// =============================================================================

/// `time,<sentence fields...>`, the sentence copied verbatim.
pub fn raw_gnss_row(time: NaiveTime, sentence: &NmeaSentence) -> Vec<String> {
    let mut row = Vec::with_capacity(sentence.fields.len() + 1);
    row.push(format_timestamp(time));
    row.extend(sentence.fields.iter().cloned());
    row
}

/// `time,$DEPTH,distance_mm,confidence,transmit_duration,scan_start,scan_length,gain,sound_speed`.
pub fn raw_ping_row(time: NaiveTime, report: &DistanceReport, sound_speed: f64) -> Vec<String> {
    vec![
        format_timestamp(time),
        DEPTH_TAG.to_string(),
        report.distance_mm.to_string(),
        report.confidence.to_string(),
        report.transmit_duration.to_string(),
        report.scan_start.to_string(),
        report.scan_length.to_string(),
        report.gain_setting.to_string(),
        sound_speed.to_string(),
    ]
}

/// One synchronized position/depth row of the simplified log.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleRecord {
    pub time: NaiveTime,
    pub latitude: f64,
    pub longitude: f64,
    pub water_depth: f64,
    pub bottom_height: f64,
    pub sound_speed: f64,
}

impl SimpleRecord {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            format_timestamp(self.time),
            self.latitude.to_string(),
            self.longitude.to_string(),
            round3(self.water_depth).to_string(),
            round3(self.bottom_height).to_string(),
            self.sound_speed.to_string(),
        ]
    }
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// =============================================================================
// Exports
// =============================================================================

/// Append `records` to a CSV file, writing the header row only when the file
/// is new or empty. Returns the number of records written.
pub fn export_csv<T: Serialize>(path: &Path, records: &[T]) -> AppResult<usize> {
    let fresh = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    serialize_records(file, fresh, records)?;
    info!("Saved {} records to '{}'", records.len(), path.display());
    Ok(records.len())
}

/// Replace the contents of `path` with a header row and `records`.
pub fn save_csv<T: Serialize>(path: &Path, records: &[T]) -> AppResult<usize> {
    serialize_records(File::create(path)?, true, records)?;
    info!("Wrote {} records to '{}'", records.len(), path.display());
    Ok(records.len())
}

fn serialize_records<T: Serialize>(file: File, headers: bool, records: &[T]) -> AppResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(headers)
        .from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
