//! GNSS receiver streaming NMEA-0183 sentences.

use crate::error::{AppResult, DaqError, DecodeError};
use crate::hardware::SensorLink;
use crate::nmea::{self, NmeaSentence};
use std::time::Duration;
use tracing::{debug, warn};

/// Line-framed NMEA receiver.
pub struct GnssReceiver {
    link: Box<dyn SensorLink>,
    timeout: Duration,
    max_attempts: u32,
}

impl GnssReceiver {
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

    /// Read the next checksum-valid sentence, fix or not.
    ///
    /// Frames that fail framing or checksum are skipped. After `max_attempts`
    /// bad frames in a row the call gives up with
    /// [`DecodeError::RetriesExhausted`] so the caller stays in control.
    /// A silent receiver surfaces as [`DaqError::Timeout`].
    pub async fn next_sentence(&mut self) -> AppResult<NmeaSentence> {
        for attempt in 1..=self.max_attempts {
            let frame = self.link.read_frame(self.timeout).await?;
            match nmea::parse_sentence(&frame) {
                Ok(sentence) => {
                    debug!(tag = sentence.tag(), "gnss sentence");
                    return Ok(sentence);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "skipping undecodable gnss frame");
                }
            }
        }
        warn!(
            attempts = self.max_attempts,
            "no decodable gnss sentence, giving control back to the loop"
        );
        Err(DaqError::Decode(DecodeError::RetriesExhausted {
            attempts: self.max_attempts,
        }))
    }
}
