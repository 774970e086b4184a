//! Message Decoder
//!
//! Turns one frame from a sensor link into a typed [`SensorMessage`]:
//! - GNSS lines are NMEA-0183 sentences; only GGA, RMC and GLL become fixes
//! - Sonar frames are Ping-protocol `distance` replies
//! - Probe lines carry a sound speed in mm/s
//!
//! Only the fields the pipeline consumes are decoded. A frame that fails
//! framing, checksum or field decoding yields a [`DecodeError`] and never a
//! partial message.

use crate::error::{DecodeError, SensorRole};
use crate::hardware::ping1d::{self, DistanceReport};
use chrono::NaiveTime;

/// Closed set of sentence kinds the pipeline distinguishes.
///
/// Decoded once from the tag at the boundary; the talker prefix (`GN`, `GP`, ...)
/// is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Gga,
    Rmc,
    Gll,
    Gsa,
    /// Sonar ping row written by the acquisition loop.
    Depth,
    Other,
}

/// Tag used for sonar ping rows in the raw log.
pub const DEPTH_TAG: &str = "$DEPTH";

impl MessageKind {
    /// Classify a row or sentence tag such as `$GNGGA` or `$DEPTH`.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim();
        if tag == DEPTH_TAG {
            return MessageKind::Depth;
        }
        let Some(body) = tag.strip_prefix('$') else {
            return MessageKind::Other;
        };
        // Talker id is two characters, proprietary sentences start with 'P'.
        if body.len() != 5 || body.starts_with('P') {
            return MessageKind::Other;
        }
        match body.get(2..).unwrap_or_default() {
            "GGA" => MessageKind::Gga,
            "RMC" => MessageKind::Rmc,
            "GLL" => MessageKind::Gll,
            "GSA" => MessageKind::Gsa,
            _ => MessageKind::Other,
        }
    }

    /// Whether this kind triggers a sonar ping.
    pub fn is_fix(&self) -> bool {
        matches!(self, MessageKind::Gga | MessageKind::Rmc | MessageKind::Gll)
    }
}

/// A checksum-valid NMEA sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct NmeaSentence {
    /// Sentence text without line ending.
    pub text: String,
    pub kind: MessageKind,
    /// Comma separated fields, tag first. The checksum suffix stays on the last field.
    pub fields: Vec<String>,
}

impl NmeaSentence {
    pub fn tag(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }

    /// Field by sentence index (tag is 0), checksum suffix removed, empty as `None`.
    pub fn field(&self, index: usize) -> Option<&str> {
        let raw = self.fields.get(index)?;
        let value = raw.split('*').next().unwrap_or_default().trim();
        (!value.is_empty()).then_some(value)
    }

    fn number(&self, index: usize) -> Result<Option<f64>, DecodeError> {
        self.field(index)
            .map(|v| {
                v.parse::<f64>().map_err(|_| {
                    DecodeError::Malformed(format!("{} field {} '{}'", self.tag(), index, v))
                })
            })
            .transpose()
    }

    fn time(&self, index: usize) -> Result<Option<NaiveTime>, DecodeError> {
        self.field(index)
            .map(|v| {
                parse_nmea_time(v).ok_or_else(|| {
                    DecodeError::Malformed(format!("{} time '{}'", self.tag(), v))
                })
            })
            .transpose()
    }

    fn coordinate(&self, value: usize) -> Result<Option<f64>, DecodeError> {
        match (self.number(value)?, self.field(value + 1)) {
            (Some(v), Some(hemisphere)) => decode_coordinate(v, hemisphere)
                .map(Some)
                .ok_or_else(|| {
                    DecodeError::Malformed(format!("{} hemisphere '{}'", self.tag(), hemisphere))
                }),
            _ => Ok(None),
        }
    }
}

/// Parse one line of NMEA text.
///
/// Accepts sentences with or without a `*hh` checksum; when present it must match
/// the XOR of every byte between `$` and `*`.
pub fn parse_sentence(frame: &[u8]) -> Result<NmeaSentence, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::NotText)?;
    let text = text.trim();
    let Some(body) = text.strip_prefix('$') else {
        return Err(DecodeError::Malformed(format!("no '$' start in '{}'", text)));
    };

    if let Some((payload, checksum)) = body.rsplit_once('*') {
        let expected = u8::from_str_radix(checksum.trim(), 16)
            .map_err(|_| DecodeError::Malformed(format!("checksum '{}'", checksum)))?;
        let computed = payload.bytes().fold(0u8, |acc, b| acc ^ b);
        if expected != computed {
            return Err(DecodeError::Checksum { expected, computed });
        }
    }

    let fields: Vec<String> = text.split(',').map(str::to_string).collect();
    if fields.len() < 2 || fields[0].len() < 4 {
        return Err(DecodeError::Malformed(format!("too few fields in '{}'", text)));
    }
    Ok(NmeaSentence {
        kind: MessageKind::from_tag(&fields[0]),
        text: text.to_string(),
        fields,
    })
}

/// Parse an NMEA `hhmmss.sss` time of day.
pub fn parse_nmea_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H%M%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H%M%S"))
        .ok()
}

/// Convert a `ddmm.mmmm` coordinate and hemisphere letter to decimal degrees.
///
/// `S` and `W` negate the result; any other letter than `N`, `S`, `E`, `W` is rejected.
pub fn decode_coordinate(value: f64, hemisphere: &str) -> Option<f64> {
    let degrees = (value / 100.0).floor();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    match hemisphere.trim() {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Position fix decoded from a GGA, RMC or GLL sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    pub kind: MessageKind,
    pub time: Option<NaiveTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Antenna height above mean sea level (GGA only).
    pub antenna_height: Option<f64>,
    /// Geoid separation (GGA only).
    pub geoid_separation: Option<f64>,
    pub hdop: Option<f64>,
    /// Knots (RMC only).
    pub speed_over_ground: Option<f64>,
    /// Degrees true (RMC only).
    pub course: Option<f64>,
}

impl Fix {
    /// Decode a fix; any sentence that is not GGA, RMC or GLL is rejected.
    pub fn from_sentence(sentence: &NmeaSentence) -> Result<Self, DecodeError> {
        let mut fix = Fix {
            kind: sentence.kind,
            time: None,
            latitude: None,
            longitude: None,
            antenna_height: None,
            geoid_separation: None,
            hdop: None,
            speed_over_ground: None,
            course: None,
        };
        match sentence.kind {
            MessageKind::Gga => {
                fix.time = sentence.time(1)?;
                fix.latitude = sentence.coordinate(2)?;
                fix.longitude = sentence.coordinate(4)?;
                fix.hdop = sentence.number(8)?;
                fix.antenna_height = sentence.number(9)?;
                fix.geoid_separation = sentence.number(11)?;
            }
            MessageKind::Rmc => {
                fix.time = sentence.time(1)?;
                fix.latitude = sentence.coordinate(3)?;
                fix.longitude = sentence.coordinate(5)?;
                fix.speed_over_ground = sentence.number(7)?;
                fix.course = sentence.number(8)?;
            }
            MessageKind::Gll => {
                fix.latitude = sentence.coordinate(1)?;
                fix.longitude = sentence.coordinate(3)?;
                fix.time = sentence.time(5)?;
            }
            _ => return Err(DecodeError::NotAFix(sentence.tag().to_string())),
        }
        Ok(fix)
    }

    /// Ellipsoidal antenna height, when both GGA components are present.
    pub fn ellipsoidal_height(&self) -> Option<f64> {
        Some(self.antenna_height? + self.geoid_separation?)
    }
}

/// Decode a probe line (integer-like mm/s) to metres per second.
pub fn decode_probe(frame: &[u8]) -> Result<f64, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::NotText)?;
    let trimmed = text.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v / 1000.0),
        _ => Err(DecodeError::ProbeValue(trimmed.to_string())),
    }
}

/// A decoded sensor message.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorMessage {
    Fix(Fix),
    Ping(DistanceReport),
    /// Surface sound speed in m/s.
    ProbeReading(f64),
}

/// Decode one frame produced by `sensor`.
pub fn decode(sensor: SensorRole, frame: &[u8]) -> Result<SensorMessage, DecodeError> {
    match sensor {
        SensorRole::Gnss => {
            let sentence = parse_sentence(frame)?;
            Fix::from_sentence(&sentence).map(SensorMessage::Fix)
        }
        SensorRole::Sonar => {
            let packet = ping1d::Packet::parse(frame)?;
            DistanceReport::from_packet(&packet).map(SensorMessage::Ping)
        }
        SensorRole::Probe => decode_probe(frame).map(SensorMessage::ProbeReading),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str =
        "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn coordinate_decode() {
        let lat = decode_coordinate(4807.038, "N").unwrap();
        let lon = decode_coordinate(1131.000, "E").unwrap();
        assert!((lat - 48.117_30).abs() < 1e-5);
        assert!((lon - 11.516_67).abs() < 1e-5);
        assert!(decode_coordinate(4807.038, "S").unwrap() < 0.0);
        assert!(decode_coordinate(4807.038, "X").is_none());
    }

    #[test]
    fn gga_fix_decoded() {
        let msg = decode(SensorRole::Gnss, GGA.as_bytes()).unwrap();
        let SensorMessage::Fix(fix) = msg else {
            panic!("expected fix");
        };
        assert_eq!(fix.kind, MessageKind::Gga);
        assert_eq!(fix.time, NaiveTime::from_hms_opt(12, 35, 19));
        assert_eq!(fix.hdop, Some(0.9));
        assert!((fix.ellipsoidal_height().unwrap() - 592.3).abs() < 1e-9);
    }

    #[test]
    fn checksum_mismatch_rejected() {
        let bad = GGA.replace("*47", "*48");
        assert!(matches!(
            parse_sentence(bad.as_bytes()),
            Err(DecodeError::Checksum { expected: 0x48, computed: 0x47 })
        ));
    }

    #[test]
    fn non_fix_sentence_is_valid_but_not_a_fix() {
        let gsa = "$GNGSA,A,3,10,07,05,02,29,04,08,13,,,,,1.72,1.03,1.38,1";
        let sentence = parse_sentence(gsa.as_bytes()).unwrap();
        assert_eq!(sentence.kind, MessageKind::Gsa);
        assert!(matches!(
            Fix::from_sentence(&sentence),
            Err(DecodeError::NotAFix(_))
        ));
    }

    #[test]
    fn tags_classified_by_sentence_type() {
        assert_eq!(MessageKind::from_tag("$GNGGA"), MessageKind::Gga);
        assert_eq!(MessageKind::from_tag("$GPRMC"), MessageKind::Rmc);
        assert_eq!(MessageKind::from_tag("$DEPTH"), MessageKind::Depth);
        assert_eq!(MessageKind::from_tag("$PUBX"), MessageKind::Other);
        assert_eq!(MessageKind::from_tag("GNGGA"), MessageKind::Other);
        assert!(MessageKind::Gll.is_fix());
        assert!(!MessageKind::Gsa.is_fix());
    }

    #[test]
    fn probe_line_scaled_to_metres_per_second() {
        assert_eq!(decode_probe(b"1482500\r\n").unwrap(), 1482.5);
        assert!(matches!(decode_probe(b"ERR\r\n"), Err(DecodeError::ProbeValue(_))));
        assert!(matches!(
            decode(SensorRole::Probe, &[0xff, 0xfe]),
            Err(DecodeError::NotText)
        ));
    }
}
