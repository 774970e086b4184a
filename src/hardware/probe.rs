//! Surface sound-speed probe.
//!
//! The probe streams one ASCII reading per line in mm/s.

use crate::error::AppResult;
use crate::hardware::SensorLink;
use crate::nmea;
use std::time::Duration;
use tracing::debug;

/// Surface sound-speed probe streaming one mm/s reading per line.
pub struct SoundSpeedProbe {
    link: Box<dyn SensorLink>,
    timeout: Duration,
}

impl SoundSpeedProbe {
    pub fn new(link: Box<dyn SensorLink>, timeout: Duration) -> Self {
        Self { link, timeout }
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

    /// Read a fresh surface sound speed in m/s.
    ///
    /// Stale buffered readings are discarded first.
    pub async fn read_sound_speed(&mut self) -> AppResult<f64> {
        self.link.clear_input().await?;
        let frame = self.link.read_frame(self.timeout).await?;
        let speed = nmea::decode_probe(&frame)?;
        debug!(speed, "probe reading");
        Ok(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DaqError, DecodeError, SensorRole};
    use crate::hardware::mock::MockLink;

    #[tokio::test]
    async fn reading_scaled_from_millimetres() {
        let link = MockLink::new(SensorRole::Probe).with_line("1482500").with_line("junk");
        let mut probe = SoundSpeedProbe::new(Box::new(link), Duration::from_millis(5));
        probe.connect().await.unwrap();

        assert_eq!(probe.read_sound_speed().await.unwrap(), 1482.5);
        assert!(matches!(
            probe.read_sound_speed().await,
            Err(DaqError::Decode(DecodeError::ProbeValue(_)))
        ));
        assert!(matches!(
            probe.read_sound_speed().await,
            Err(DaqError::Timeout { .. })
        ));
    }
}
