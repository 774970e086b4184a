//! Survey metadata structures and handling.
//!
//! A [`Metadata`] value is built once when a survey is configured and is then
//! passed by reference to every component that needs offsets, ports or the
//! default sound speed. It is persisted as the nine-row header of every log
//! file produced for the survey, in the fixed order
//! Survey, Geodetics, Vessel, GNSS, Sonar, SVP, GNSS_Com, Sonar_Com, SVP_Com.

use crate::data::LogValue;
use crate::error::{AppResult, DaqError};
use crate::validation::{is_not_empty, is_single_token, is_valid_baud_rate};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of metadata rows in every header block.
pub const METADATA_ROWS: usize = 9;

/// Date format written into the survey row.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// File type tag written as the first row of every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Survey configuration file (header only).
    Config,
    /// Interleaved raw sensor log.
    RawLog,
    /// Synchronized position/depth log.
    SimpleLog,
}

impl LogKind {
    /// Tag as written on disk.
    pub fn tag(&self) -> &'static str {
        match self {
            LogKind::Config => "OSPLIB_CONFIG",
            LogKind::RawLog => "OSP_RAW_LOG",
            LogKind::SimpleLog => "OSP_SIMPLE_LOG",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for LogKind {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OSPLIB_CONFIG" => Ok(LogKind::Config),
            "OSP_RAW_LOG" => Ok(LogKind::RawLog),
            "OSP_SIMPLE_LOG" => Ok(LogKind::SimpleLog),
            other => Err(DaqError::LogFormat(format!("Unknown file type tag '{}'", other))),
        }
    }
}

/// Survey identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyInfo {
    pub name: String,
    pub location: String,
    /// UTC survey date.
    pub date: NaiveDate,
}

/// Reference ellipsoid constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geodetics {
    #[serde(default = "default_semi_major_axis")]
    pub semi_major_axis: f64,
    #[serde(default = "default_inverse_flattening")]
    pub inverse_flattening: f64,
}

impl Default for Geodetics {
    fn default() -> Self {
        Self {
            semi_major_axis: default_semi_major_axis(),
            inverse_flattening: default_inverse_flattening(),
        }
    }
}

fn default_semi_major_axis() -> f64 {
    6_378_137.0
}

fn default_inverse_flattening() -> f64 {
    298.257_223_563
}

fn default_reserved() -> [LogValue; 3] {
    [
        LogValue::Number(0.0),
        LogValue::Number(0.0),
        LogValue::Number(0.0),
    ]
}

/// GNSS antenna or sonar transducer description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Metres from the waterline to the reference point, positive above water.
    pub waterline_offset: f64,
    /// Unused lever-arm triplet carried through for compatibility.
    #[serde(default = "default_reserved")]
    pub reserved: [LogValue; 3],
}

/// Sound velocity probe description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvpDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Sound speed (m/s) used when no probe reading is available.
    pub default_sound_speed: f64,
}

/// Serial connection of one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommDescriptor {
    pub name: String,
    pub port: String,
    pub baud: u32,
}

/// Immutable survey configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Name, location and date; the name prefixes every log file.
    pub survey: SurveyInfo,
    #[serde(default)]
    pub geodetics: Geodetics,
    pub vessel: String,
    pub gnss: SensorDescriptor,
    pub sonar: SensorDescriptor,
    pub svp: SvpDescriptor,
    pub gnss_com: CommDescriptor,
    pub sonar_com: CommDescriptor,
    pub svp_com: CommDescriptor,
}

impl Metadata {
    /// Validates the metadata.
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |field: &str, reason: &str| {
            DaqError::Configuration(format!("{}: {}", field, reason))
        };

        is_single_token(&self.survey.name).map_err(|e| invalid("survey.name", e))?;
        is_not_empty(&self.survey.location).map_err(|e| invalid("survey.location", e))?;
        is_single_token(&self.vessel).map_err(|e| invalid("vessel", e))?;

        if !(self.geodetics.semi_major_axis > 0.0 && self.geodetics.inverse_flattening > 0.0) {
            return Err(invalid("geodetics", "ellipsoid constants must be positive"));
        }
        if self.gnss.waterline_offset < 0.0 {
            return Err(invalid(
                "gnss.waterline_offset",
                "antenna must be at or above the waterline (>= 0)",
            ));
        }
        if self.sonar.waterline_offset > 0.0 {
            return Err(invalid(
                "sonar.waterline_offset",
                "transducer must be at or below the waterline (<= 0)",
            ));
        }
        if !(self.svp.default_sound_speed > 0.0) {
            return Err(invalid("svp.default_sound_speed", "must be positive"));
        }

        for (field, comm) in [
            ("gnss_com", &self.gnss_com),
            ("sonar_com", &self.sonar_com),
            ("svp_com", &self.svp_com),
        ] {
            is_not_empty(&comm.port).map_err(|e| invalid(field, e))?;
            is_valid_baud_rate(comm.baud).map_err(|e| invalid(field, e))?;
        }
        Ok(())
    }

    /// Render the nine header rows.
    pub fn to_header_rows(&self) -> Vec<Vec<String>> {
        let sensor_row = |s: &SensorDescriptor| {
            let mut row = vec![s.name.clone(), s.kind.clone(), s.waterline_offset.to_string()];
            row.extend(s.reserved.iter().map(ToString::to_string));
            row
        };
        let comm_row =
            |c: &CommDescriptor| vec![c.name.clone(), c.port.clone(), c.baud.to_string()];

        vec![
            vec![
                self.survey.name.clone(),
                self.survey.location.clone(),
                self.survey.date.format(DATE_FORMAT).to_string(),
            ],
            vec![
                self.geodetics.semi_major_axis.to_string(),
                self.geodetics.inverse_flattening.to_string(),
            ],
            vec![self.vessel.clone()],
            sensor_row(&self.gnss),
            sensor_row(&self.sonar),
            vec![
                self.svp.name.clone(),
                self.svp.kind.clone(),
                self.svp.default_sound_speed.to_string(),
            ],
            comm_row(&self.gnss_com),
            comm_row(&self.sonar_com),
            comm_row(&self.svp_com),
        ]
    }

    /// Rebuild metadata from the rows found between `Header_Start` and `Header_End`.
    ///
    /// Only the first nine rows are used. A missing row or field, or a required
    /// numeric field that does not parse, aborts with [`DaqError::LogFormat`].
    pub fn from_header_rows(rows: &[Vec<String>]) -> AppResult<Self> {
        if rows.len() < METADATA_ROWS {
            return Err(DaqError::LogFormat(format!(
                "Header has {} metadata rows, expected {}",
                rows.len(),
                METADATA_ROWS
            )));
        }
        let row = |i: usize| HeaderRow {
            index: i,
            fields: &rows[i],
        };

        let survey = row(0);
        let geodetics = row(1);
        let gnss = row(3);
        let sonar = row(4);
        let svp = row(5);

        Ok(Metadata {
            survey: SurveyInfo {
                name: survey.text(0)?,
                location: survey.text(1)?,
                date: parse_survey_date(&survey.text(2)?)?,
            },
            geodetics: Geodetics {
                semi_major_axis: geodetics.number(0)?,
                inverse_flattening: geodetics.number(1)?,
            },
            vessel: row(2).text(0)?,
            gnss: gnss.sensor()?,
            sonar: sonar.sensor()?,
            svp: SvpDescriptor {
                name: svp.text(0)?,
                kind: svp.text(1)?,
                default_sound_speed: svp.number(2)?,
            },
            gnss_com: row(6).comm()?,
            sonar_com: row(7).comm()?,
            svp_com: row(8).comm()?,
        })
    }
}

struct HeaderRow<'a> {
    index: usize,
    fields: &'a [String],
}

impl HeaderRow<'_> {
    fn text(&self, i: usize) -> AppResult<String> {
        self.fields
            .get(i)
            .map(|f| f.trim().to_string())
            .ok_or_else(|| {
                DaqError::LogFormat(format!(
                    "Header row {} is missing field {}",
                    self.index + 1,
                    i + 1
                ))
            })
    }

    fn number<T: FromStr>(&self, i: usize) -> AppResult<T> {
        let raw = self.text(i)?;
        raw.parse().map_err(|_| {
            DaqError::LogFormat(format!(
                "Header row {} field {} is not numeric: '{}'",
                self.index + 1,
                i + 1,
                raw
            ))
        })
    }

    fn sensor(&self) -> AppResult<SensorDescriptor> {
        let reserved = |i: usize| -> AppResult<LogValue> {
            let raw = self.text(i)?;
            Ok(LogValue::parse(&raw).unwrap_or(LogValue::Text(raw)))
        };
        Ok(SensorDescriptor {
            name: self.text(0)?,
            kind: self.text(1)?,
            waterline_offset: self.number(2)?,
            reserved: [reserved(3)?, reserved(4)?, reserved(5)?],
        })
    }

    fn comm(&self) -> AppResult<CommDescriptor> {
        Ok(CommDescriptor {
            name: self.text(0)?,
            port: self.text(1)?,
            baud: self.number(2)?,
        })
    }
}

fn parse_survey_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date())
        })
        .map_err(|_| DaqError::LogFormat(format!("Survey date '{}' is not a date", raw)))
}

/// A builder for constructing `Metadata` instances.
///
/// Sensor and comm descriptors default to the conventional names used on the
/// survey vessel; only the values that differ between surveys need setting.
pub struct MetadataBuilder {
    inner: Metadata,
}

impl MetadataBuilder {
    pub fn new(survey_name: &str, date: NaiveDate) -> Self {
        let sensor = |name: &str, kind: &str| SensorDescriptor {
            name: name.to_string(),
            kind: kind.to_string(),
            waterline_offset: 0.0,
            reserved: default_reserved(),
        };
        let comm = |name: &str| CommDescriptor {
            name: name.to_string(),
            port: String::new(),
            baud: 115_200,
        };
        Self {
            inner: Metadata {
                survey: SurveyInfo {
                    name: survey_name.to_string(),
                    location: "Unknown".to_string(),
                    date,
                },
                geodetics: Geodetics::default(),
                vessel: "Vessel".to_string(),
                gnss: sensor("GNSS", "GNSS"),
                sonar: sensor("Sonar", "Single_Beam"),
                svp: SvpDescriptor {
                    name: "SVP".to_string(),
                    kind: "Surface_Probe".to_string(),
                    default_sound_speed: 1500.0,
                },
                gnss_com: comm("GNSS_Com"),
                sonar_com: comm("Sonar_Com"),
                svp_com: CommDescriptor {
                    baud: 9600,
                    ..comm("SVP_Com")
                },
            },
        }
    }

    pub fn location(mut self, location: &str) -> Self {
        self.inner.survey.location = location.to_string();
        self
    }

    pub fn vessel(mut self, vessel: &str) -> Self {
        self.inner.vessel = vessel.to_string();
        self
    }

    pub fn gnss_offset(mut self, offset: f64) -> Self {
        self.inner.gnss.waterline_offset = offset;
        self
    }

    pub fn sonar_offset(mut self, offset: f64) -> Self {
        self.inner.sonar.waterline_offset = offset;
        self
    }

    pub fn default_sound_speed(mut self, speed: f64) -> Self {
        self.inner.svp.default_sound_speed = speed;
        self
    }

    pub fn gnss_port(mut self, port: &str, baud: u32) -> Self {
        self.inner.gnss_com.port = port.to_string();
        self.inner.gnss_com.baud = baud;
        self
    }

    pub fn sonar_port(mut self, port: &str, baud: u32) -> Self {
        self.inner.sonar_com.port = port.to_string();
        self.inner.sonar_com.baud = baud;
        self
    }

    pub fn svp_port(mut self, port: &str, baud: u32) -> Self {
        self.inner.svp_com.port = port.to_string();
        self.inner.svp_com.baud = baud;
        self
    }

    /// Finish and validate.
    pub fn build(self) -> AppResult<Metadata> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}
