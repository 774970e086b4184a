//! Sounding Extractor
//!
//! Folds the interleaved raw log rows into discrete [`Sounding`]s. The fold
//! carries the latest fix (time, position), RMC motion, GGA quality and
//! ellipsoidal antenna height, plus the kind of the previous row:
//!
//! - `$GNRMC` updates time, position, speed over ground and heading
//! - `$GNGGA` updates time, position, HDOP and antenna ellipsoidal height
//! - `$DEPTH` emits a sounding only when the previous row was `$GNGGA`
//!
//! A row that fails conversion is transparent: it changes no state and does
//! not become the previous row, so it cannot cost the next depth its GGA.

use crate::data::reader::RawLogRecord;
use crate::data::storage::round3;
use crate::data::LogValue;
use crate::error::{AppResult, DaqError};
use crate::metadata::Metadata;
use crate::nmea::{self, MessageKind};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// One vertically referenced depth observation.
///
/// Depths and heights are metres, negative below the waterline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sounding {
    pub time: NaiveTime,
    /// Per-extraction counter starting at 0.
    pub sequence_number: u64,
    pub latitude: f64,
    pub longitude: f64,
    /// Antenna height plus geoid separation from the preceding GGA.
    pub antenna_ellipsoidal_height: f64,
    /// Degrees true from the last RMC.
    pub heading: Option<f64>,
    /// Knots from the last RMC.
    pub speed_over_ground: Option<f64>,
    pub hdop: Option<f64>,
    /// Ping distance plus the sonar waterline offset.
    pub water_depth: f64,
    pub bottom_ellipsoidal_height: f64,
    /// Sound speed the sonar was using when it pinged.
    pub sound_speed: f64,
    /// Set by sound-speed correction; raw fields are kept alongside.
    pub corrected_depth: Option<f64>,
    /// Bottom height shifted by the depth correction.
    pub corrected_bottom_ellipsoidal_height: Option<f64>,
    /// Harmonic mean used for the correction.
    pub corrected_sound_speed: Option<f64>,
}

impl Sounding {
    /// Corrected depth when available, raw depth otherwise.
    pub fn best_depth(&self) -> f64 {
        self.corrected_depth.unwrap_or(self.water_depth)
    }
}

#[derive(Debug, Clone, Copy)]
struct Position {
    time: NaiveTime,
    latitude: f64,
    longitude: f64,
}

/// Stateful row-by-row reducer.
#[derive(Debug)]
pub struct SoundingExtractor {
    gnss_offset: f64,
    sonar_offset: f64,
    position: Option<Position>,
    heading: Option<f64>,
    speed_over_ground: Option<f64>,
    hdop: Option<f64>,
    antenna_ellipsoidal_height: Option<f64>,
    previous: Option<MessageKind>,
    next_sequence: u64,
}

impl SoundingExtractor {
    pub fn new(metadata: &Metadata) -> Self {
        Self {
            gnss_offset: metadata.gnss.waterline_offset,
            sonar_offset: metadata.sonar.waterline_offset,
            position: None,
            heading: None,
            speed_over_ground: None,
            hdop: None,
            antenna_ellipsoidal_height: None,
            previous: None,
            next_sequence: 0,
        }
    }

    /// Fold one row.
    ///
    /// On error the extractor state is exactly as before the call.
    pub fn push(&mut self, record: &RawLogRecord) -> AppResult<Option<Sounding>> {
        let emitted = match record.kind {
            MessageKind::Rmc => {
                let position = decode_position(record, 2, 4, 6)?;
                let speed_over_ground = record.optional_number(8)?;
                let heading = record.optional_number(9)?;

                self.position = Some(position);
                self.speed_over_ground = speed_over_ground;
                self.heading = heading;
                None
            }
            MessageKind::Gga => {
                let position = decode_position(record, 2, 3, 5)?;
                let hdop = record.optional_number(9)?;
                let antenna_height = record.number(10)?;
                let separation = record.number(12)?;

                self.position = Some(position);
                self.hdop = hdop;
                self.antenna_ellipsoidal_height = Some(round3(antenna_height + separation));
                None
            }
            MessageKind::Depth if self.previous == Some(MessageKind::Gga) => {
                Some(self.sounding(record)?)
            }
            MessageKind::Depth => {
                debug!(time = %record.time, "depth without a preceding GGA discarded");
                None
            }
            _ => None,
        };
        self.previous = Some(record.kind);
        if emitted.is_some() {
            self.next_sequence += 1;
        }
        Ok(emitted)
    }

    fn sounding(&self, record: &RawLogRecord) -> AppResult<Sounding> {
        let distance_mm = record.number(2)?;
        let sound_speed = record
            .from_end(1)
            .and_then(LogValue::as_f64)
            .ok_or_else(|| {
                DaqError::conversion(
                    "$DEPTH sound speed",
                    field_text(record, record.len().saturating_sub(1)),
                )
            })?;
        let (Some(position), Some(antenna)) = (self.position, self.antenna_ellipsoidal_height)
        else {
            return Err(DaqError::conversion("$DEPTH fix", "no GGA fix decoded yet"));
        };

        let water_depth = -distance_mm / 1000.0 + self.sonar_offset;
        let bottom_ellipsoidal_height = antenna - self.gnss_offset + water_depth;
        Ok(Sounding {
            time: position.time,
            sequence_number: self.next_sequence,
            latitude: position.latitude,
            longitude: position.longitude,
            antenna_ellipsoidal_height: antenna,
            heading: self.heading,
            speed_over_ground: self.speed_over_ground,
            hdop: self.hdop,
            water_depth,
            bottom_ellipsoidal_height,
            sound_speed,
            corrected_depth: None,
            corrected_bottom_ellipsoidal_height: None,
            corrected_sound_speed: None,
        })
    }
}

/// Extract every sounding from a row stream, skipping rows that fail conversion.
pub fn extract_soundings(metadata: &Metadata, records: &[RawLogRecord]) -> Vec<Sounding> {
    let mut extractor = SoundingExtractor::new(metadata);
    let mut skipped = 0usize;
    let soundings: Vec<Sounding> = records
        .iter()
        .filter_map(|record| match extractor.push(record) {
            Ok(sounding) => sounding,
            Err(e) => {
                skipped += 1;
                warn!(time = %record.time, tag = record.tag(), error = %e, "row skipped");
                None
            }
        })
        .collect();
    info!(
        "Extracted {} soundings from {} rows ({} skipped)",
        soundings.len(),
        records.len(),
        skipped
    );
    soundings
}

/// Read soundings back from a CSV export.
pub fn read_soundings(path: &Path) -> AppResult<Vec<Sounding>> {
    let mut reader = csv::Reader::from_path(path)?;
    let soundings = reader
        .deserialize()
        .collect::<Result<Vec<Sounding>, csv::Error>>()?;
    Ok(soundings)
}

fn decode_position(record: &RawLogRecord, t: usize, la: usize, lo: usize) -> AppResult<Position> {
    let time = match record.get(t) {
        Some(LogValue::Number(n)) => time_from_number(*n),
        Some(LogValue::Text(s)) => nmea::parse_nmea_time(s),
        None => None,
    }
    .ok_or_else(|| DaqError::conversion(format!("{} time", record.tag()), field_text(record, t)))?;

    let coordinate = |index: usize| -> AppResult<f64> {
        let value = record.number(index)?;
        let hemisphere = record.text(index + 1)?;
        nmea::decode_coordinate(value, &hemisphere)
            .ok_or_else(|| DaqError::conversion(format!("{} hemisphere", record.tag()), hemisphere))
    };

    Ok(Position {
        time,
        latitude: coordinate(la)?,
        longitude: coordinate(lo)?,
    })
}

fn field_text(record: &RawLogRecord, index: usize) -> String {
    record.get(index).map(ToString::to_string).unwrap_or_default()
}

/// NMEA `hhmmss.ss` that was coerced to a number on read (leading zeros lost).
fn time_from_number(value: f64) -> Option<NaiveTime> {
    if !(0.0..240_000.0).contains(&value) {
        return None;
    }
    let hours = (value / 10_000.0).floor();
    let minutes = ((value - hours * 10_000.0) / 100.0).floor();
    let seconds = value - hours * 10_000.0 - minutes * 100.0;
    let whole = seconds.floor();
    let micros = ((seconds - whole) * 1_000_000.0).round().min(999_999.0);
    NaiveTime::from_hms_micro_opt(hours as u32, minutes as u32, whole as u32, micros as u32)
}
