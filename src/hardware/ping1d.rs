//! Ping-protocol single-beam echo sounder.
//!
//! Wire format (all integers little endian):
//!
//! ```text
//! "BR" | payload_len u16 | message_id u16 | src u8 | dst u8 | payload | checksum u16
//! ```
//!
//! The checksum is the wrapping sum of every preceding byte of the frame.
//! The host asks for data with a `general_request` naming the wanted message id;
//! setters are answered with `ack` or `nack`.

use crate::error::{AppResult, DaqError, DecodeError, SensorRole};
use crate::hardware::SensorLink;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

const SYNC: &[u8; 2] = b"BR";
const HEADER_LEN: usize = 8;
const CHECKSUM_LEN: usize = 2;
const MAX_PAYLOAD: usize = 1024;

/// Message ids used by the acquisition pipeline.
pub mod ids {
    pub const ACK: u16 = 1;
    pub const NACK: u16 = 2;
    pub const GENERAL_REQUEST: u16 = 6;
    pub const SET_SPEED_OF_SOUND: u16 = 1002;
    pub const SPEED_OF_SOUND: u16 = 1203;
    pub const DISTANCE: u16 = 1212;
}

/// One Ping-protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub message_id: u16,
    pub src_device: u8,
    pub dst_device: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(message_id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            message_id,
            src_device: 0,
            dst_device: 0,
            payload: payload.into(),
        }
    }

    /// Ask the device to send `message_id`.
    pub fn general_request(message_id: u16) -> Self {
        let mut payload = BytesMut::with_capacity(2);
        payload.put_u16_le(message_id);
        Self::new(ids::GENERAL_REQUEST, payload.freeze())
    }

    /// Set the operating sound speed in mm/s.
    pub fn set_speed_of_sound(mm_per_s: u32) -> Self {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32_le(mm_per_s);
        Self::new(ids::SET_SPEED_OF_SOUND, payload.freeze())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        buf.put_slice(SYNC);
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_u16_le(self.message_id);
        buf.put_u8(self.src_device);
        buf.put_u8(self.dst_device);
        buf.put_slice(&self.payload);
        let checksum = checksum(&buf);
        buf.put_u16_le(checksum);
        buf.to_vec()
    }

    /// Parse one complete frame.
    pub fn parse(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(DecodeError::PingFrame(format!("{} byte frame is too short", frame.len())));
        }
        if &frame[..2] != SYNC {
            return Err(DecodeError::PingFrame("missing 'BR' start".into()));
        }
        let mut header = &frame[2..HEADER_LEN];
        let payload_len = header.get_u16_le() as usize;
        let message_id = header.get_u16_le();
        let src_device = header.get_u8();
        let dst_device = header.get_u8();

        let body_end = HEADER_LEN + payload_len;
        if frame.len() != body_end + CHECKSUM_LEN {
            return Err(DecodeError::PingFrame(format!(
                "payload length {} does not match {} byte frame",
                payload_len,
                frame.len()
            )));
        }
        let expected = u16::from_le_bytes([frame[body_end], frame[body_end + 1]]);
        let computed = checksum(&frame[..body_end]);
        if expected != computed {
            return Err(DecodeError::PingFrame(format!(
                "checksum {:#06x} != computed {:#06x}",
                expected, computed
            )));
        }
        Ok(Self {
            message_id,
            src_device,
            dst_device,
            payload: Bytes::copy_from_slice(&frame[HEADER_LEN..body_end]),
        })
    }

    fn expect(&self, message_id: u16, min_len: usize) -> Result<Bytes, DecodeError> {
        if self.message_id == ids::NACK {
            return Err(nack_error(self));
        }
        if self.message_id != message_id {
            return Err(DecodeError::UnexpectedMessage {
                expected: message_id,
                received: self.message_id,
            });
        }
        if self.payload.len() < min_len {
            return Err(DecodeError::PingFrame(format!(
                "message {} payload has {} bytes, expected {}",
                message_id,
                self.payload.len(),
                min_len
            )));
        }
        Ok(self.payload.clone())
    }
}

fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |acc, b| acc.wrapping_add(u16::from(*b)))
}

fn nack_error(packet: &Packet) -> DecodeError {
    let mut payload = packet.payload.clone();
    let message_id = if payload.remaining() >= 2 { payload.get_u16_le() } else { 0 };
    let reason = String::from_utf8_lossy(&payload)
        .trim_end_matches('\0')
        .to_string();
    DecodeError::Nack { message_id, reason }
}

/// Read bytes until one whole frame (sync through checksum) has arrived.
///
/// Bytes ahead of the `BR` sync are discarded.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut previous = 0u8;
    loop {
        let byte = reader.read_u8().await?;
        if previous == SYNC[0] && byte == SYNC[1] {
            break;
        }
        previous = byte;
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + CHECKSUM_LEN);
    frame.extend_from_slice(SYNC);
    let mut rest = [0u8; HEADER_LEN - 2];
    reader.read_exact(&mut rest).await?;
    frame.extend_from_slice(&rest);

    let payload_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("ping payload length {} exceeds {}", payload_len, MAX_PAYLOAD),
        ));
    }
    let mut body = vec![0u8; payload_len + CHECKSUM_LEN];
    reader.read_exact(&mut body).await?;
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Payload of a `distance` (1212) message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceReport {
    /// Distance to target in millimetres.
    pub distance_mm: u32,
    /// Confidence in percent.
    pub confidence: u16,
    /// Acoustic pulse length in microseconds.
    pub transmit_duration: u16,
    pub ping_number: u32,
    /// Start of the scan window in millimetres.
    pub scan_start: u32,
    /// Length of the scan window in millimetres.
    pub scan_length: u32,
    pub gain_setting: u32,
}

impl DistanceReport {
    const PAYLOAD_LEN: usize = 24;

    pub fn from_packet(packet: &Packet) -> Result<Self, DecodeError> {
        let mut p = packet.expect(ids::DISTANCE, Self::PAYLOAD_LEN)?;
        Ok(Self {
            distance_mm: p.get_u32_le(),
            confidence: p.get_u16_le(),
            transmit_duration: p.get_u16_le(),
            ping_number: p.get_u32_le(),
            scan_start: p.get_u32_le(),
            scan_length: p.get_u32_le(),
            gain_setting: p.get_u32_le(),
        })
    }

    pub fn to_packet(&self) -> Packet {
        let mut p = BytesMut::with_capacity(Self::PAYLOAD_LEN);
        p.put_u32_le(self.distance_mm);
        p.put_u16_le(self.confidence);
        p.put_u16_le(self.transmit_duration);
        p.put_u32_le(self.ping_number);
        p.put_u32_le(self.scan_start);
        p.put_u32_le(self.scan_length);
        p.put_u32_le(self.gain_setting);
        Packet::new(ids::DISTANCE, p.freeze())
    }
}

/// Build the `speed_of_sound` (1203) reply carrying `mm_per_s`.
pub fn speed_of_sound_packet(mm_per_s: u32) -> Packet {
    let mut p = BytesMut::with_capacity(4);
    p.put_u32_le(mm_per_s);
    Packet::new(ids::SPEED_OF_SOUND, p.freeze())
}

/// Build an `ack` for `message_id`.
pub fn ack_packet(message_id: u16) -> Packet {
    let mut p = BytesMut::with_capacity(2);
    p.put_u16_le(message_id);
    Packet::new(ids::ACK, p.freeze())
}

/// Driver for a Ping-protocol sonar on any [`SensorLink`].
pub struct PingSonar {
    link: Box<dyn SensorLink>,
    timeout: Duration,
    /// Unrelated frames tolerated while waiting for a reply.
    max_attempts: u32,
}

impl PingSonar {
    pub fn new(link: Box<dyn SensorLink>, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            link,
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn connect(&mut self) -> AppResult<()> {
        self.link.connect().await
    }

    pub async fn disconnect(&mut self) -> AppResult<()> {
        self.link.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Take one ping.
    pub async fn ping(&mut self) -> AppResult<DistanceReport> {
        let reply = self.request(ids::DISTANCE).await?;
        let report = DistanceReport::from_packet(&reply)?;
        debug!(
            distance_mm = report.distance_mm,
            confidence = report.confidence,
            "sonar ping"
        );
        Ok(report)
    }

    /// Set the operating sound speed (m/s) and wait for the acknowledgement.
    pub async fn set_sound_speed(&mut self, metres_per_s: f64) -> AppResult<()> {
        if !(metres_per_s.is_finite() && metres_per_s > 0.0) {
            return Err(DaqError::SoundSpeedSource(format!(
                "refusing to set sound speed {} m/s",
                metres_per_s
            )));
        }
        let mm_per_s = (metres_per_s * 1000.0).round() as u32;
        info!("Setting sound speed to {} m/s on sonar head", metres_per_s);
        self.send(&Packet::set_speed_of_sound(mm_per_s)).await?;

        let reply = self.await_reply(ids::ACK).await?;
        let mut payload = reply.expect(ids::ACK, 2)?;
        let acked = payload.get_u16_le();
        if acked != ids::SET_SPEED_OF_SOUND {
            return Err(DecodeError::UnexpectedMessage {
                expected: ids::SET_SPEED_OF_SOUND,
                received: acked,
            }
            .into());
        }
        Ok(())
    }

    /// Read the operating sound speed (m/s) back from the sonar.
    pub async fn sound_speed(&mut self) -> AppResult<f64> {
        let reply = self.request(ids::SPEED_OF_SOUND).await?;
        let mut payload = reply.expect(ids::SPEED_OF_SOUND, 4)?;
        let speed = f64::from(payload.get_u32_le()) / 1000.0;
        info!("Sound speed is {} m/s on sonar head", speed);
        Ok(speed)
    }

    async fn request(&mut self, message_id: u16) -> AppResult<Packet> {
        self.send(&Packet::general_request(message_id)).await?;
        self.await_reply(message_id).await
    }

    async fn send(&mut self, packet: &Packet) -> AppResult<()> {
        self.link.send_command(&packet.encode()).await
    }

    /// Wait for `message_id` (or a nack), skipping unrelated or corrupt frames.
    async fn await_reply(&mut self, message_id: u16) -> AppResult<Packet> {
        for _ in 0..self.max_attempts {
            let frame = self.link.read_frame(self.timeout).await?;
            match Packet::parse(&frame) {
                Ok(packet) if packet.message_id == message_id => return Ok(packet),
                Ok(packet) if packet.message_id == ids::NACK => {
                    return Err(nack_error(&packet).into())
                }
                Ok(packet) => {
                    debug!(
                        expected = message_id,
                        received = packet.message_id,
                        "skipping unrelated sonar message"
                    );
                }
                Err(e) => debug!(error = %e, "skipping corrupt sonar frame"),
            }
        }
        Err(DaqError::Decode(DecodeError::RetriesExhausted {
            attempts: self.max_attempts,
        }))
    }
}

impl std::fmt::Debug for PingSonar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingSonar")
            .field("role", &SensorRole::Sonar)
            .field("connected", &self.link.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{ping_responder, MockLink};

    fn report() -> DistanceReport {
        DistanceReport {
            distance_mm: 5000,
            confidence: 100,
            transmit_duration: 50,
            ping_number: 7,
            scan_start: 0,
            scan_length: 20000,
            gain_setting: 3,
        }
    }

    #[test]
    fn frame_layout() {
        let frame = Packet::general_request(ids::DISTANCE).encode();
        assert_eq!(&frame[..2], b"BR");
        assert_eq!(u16::from_le_bytes([frame[2], frame[3]]), 2);
        assert_eq!(u16::from_le_bytes([frame[4], frame[5]]), ids::GENERAL_REQUEST);
        assert_eq!(u16::from_le_bytes([frame[8], frame[9]]), ids::DISTANCE);
        let sum: u16 = frame[..10].iter().map(|b| u16::from(*b)).sum();
        assert_eq!(u16::from_le_bytes([frame[10], frame[11]]), sum);
    }

    #[test]
    fn distance_report_decodes() {
        let packet = Packet::parse(&report().to_packet().encode()).unwrap();
        assert_eq!(DistanceReport::from_packet(&packet).unwrap(), report());
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut frame = report().to_packet().encode();
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert!(matches!(Packet::parse(&frame), Err(DecodeError::PingFrame(_))));
    }

    #[test]
    fn nack_surfaces_reason() {
        let mut payload = BytesMut::new();
        payload.put_u16_le(ids::SET_SPEED_OF_SOUND);
        payload.put_slice(b"out of range\0");
        let nack = Packet::new(ids::NACK, payload.freeze());
        let err = DistanceReport::from_packet(&nack).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Nack {
                message_id: ids::SET_SPEED_OF_SOUND,
                reason: "out of range".into()
            }
        );
    }

    #[tokio::test]
    async fn frame_reader_resynchronises() {
        let mut bytes = b"garbage B".to_vec();
        bytes.extend(report().to_packet().encode());
        let mut reader = std::io::Cursor::new(bytes);
        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(DistanceReport::from_packet(&Packet::parse(&frame).unwrap()).unwrap(), report());
    }

    #[tokio::test]
    async fn driver_sets_and_reads_back_sound_speed() {
        let link = MockLink::new(SensorRole::Sonar).with_responder(ping_responder(5000));
        let mut sonar = PingSonar::new(Box::new(link), Duration::from_millis(50), 5);
        sonar.connect().await.unwrap();

        sonar.set_sound_speed(1482.5).await.unwrap();
        assert_eq!(sonar.sound_speed().await.unwrap(), 1482.5);
        assert_eq!(sonar.ping().await.unwrap().distance_mm, 5000);
    }

    #[tokio::test]
    async fn silent_sonar_times_out() {
        let link = MockLink::new(SensorRole::Sonar);
        let mut sonar = PingSonar::new(Box::new(link), Duration::from_millis(10), 3);
        sonar.connect().await.unwrap();
        assert!(matches!(
            sonar.ping().await,
            Err(DaqError::Timeout { sensor: SensorRole::Sonar, .. })
        ));
    }
}
