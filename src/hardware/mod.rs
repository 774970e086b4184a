//! Sensor hardware
//!
//! Every physical sensor is reached through a [`SensorLink`]: a framed byte
//! stream with the four operations the acquisition loop relies on (connect,
//! read one frame, send one command, disconnect). The drivers on top of it
//! know each sensor's framing and protocol:
//!
//! - [`gnss::GnssReceiver`] - line-framed NMEA sentences
//! - [`ping1d::PingSonar`] - binary Ping-protocol single-beam echo sounder
//! - [`probe::SoundSpeedProbe`] - line-framed surface sound speed in mm/s
//!
//! [`serial_link::StreamLink`] backs a link with a serial port (or any async
//! byte stream); [`mock::MockLink`] scripts frames for tests.

pub mod gnss;
pub mod mock;
pub mod ping1d;
pub mod probe;
pub mod serial_link;

use crate::error::{AppResult, SensorRole};
use async_trait::async_trait;
use std::time::Duration;

pub use gnss::GnssReceiver;
pub use ping1d::PingSonar;
pub use probe::SoundSpeedProbe;
pub use serial_link::{Framing, StreamLink};

// =============================================================================
// SensorLink Capability
// =============================================================================

/// Framed byte-stream connection to one sensor.
///
/// Implementations must not block beyond the timeout given to
/// [`read_frame`](SensorLink::read_frame) so a silent sensor cannot stall
/// an acquisition cycle.
#[async_trait]
pub trait SensorLink: Send {
    /// Which sensor this link talks to.
    fn role(&self) -> SensorRole;

    /// Open the link.
    ///
    /// # Errors
    /// [`DaqError::LinkUnavailable`](crate::error::DaqError::LinkUnavailable)
    /// when the device cannot be reached.
    async fn connect(&mut self) -> AppResult<()>;

    /// Read one complete frame.
    ///
    /// # Errors
    /// [`DaqError::Timeout`](crate::error::DaqError::Timeout) when nothing
    /// arrives within `timeout`.
    async fn read_frame(&mut self, timeout: Duration) -> AppResult<Vec<u8>>;

    /// Write one command frame.
    async fn send_command(&mut self, command: &[u8]) -> AppResult<()>;

    /// Release the link. Disconnecting a closed link is a no-op.
    async fn disconnect(&mut self) -> AppResult<()>;

    fn is_connected(&self) -> bool;

    /// Discard any bytes received but not yet read.
    async fn clear_input(&mut self) -> AppResult<()> {
        Ok(())
    }
}
