//! Stream-backed sensor links.
//!
//! A [`StreamLink`] frames any async byte stream: a real serial port opened
//! through tokio-serial, or an in-memory duplex stream in tests.

use crate::error::{AppResult, DaqError, SensorRole};
use crate::hardware::{ping1d, SensorLink};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

// =============================================================================
// Serial Port Trait
// =============================================================================

/// Trait alias for async serial port I/O.
///
/// Satisfied by `tokio_serial::SerialStream` on hardware and by
/// `tokio::io::DuplexStream` in tests.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// How frames are delimited on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Newline-terminated text (NMEA, probe readings).
    Line,
    /// Binary Ping-protocol frames.
    PingProtocol,
}

/// Open a serial port (8N1, no flow control) without blocking the runtime.
#[cfg(feature = "tokio_serial")]
pub async fn open_serial_async(
    role: SensorRole,
    port_path: &str,
    baud_rate: u32,
) -> AppResult<DynSerial> {
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let port = spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
    })
    .await
    .map_err(|e| DaqError::LinkUnavailable {
        sensor: role,
        reason: format!("spawn_blocking for serial port opening failed: {}", e),
    })?
    .map_err(|e| DaqError::LinkUnavailable {
        sensor: role,
        reason: format!("Failed to open {} at {} baud: {}", port_path, baud_rate, e),
    })?;
    Ok(Box::new(port))
}

/// Serial support is compiled out; every open fails.
#[cfg(not(feature = "tokio_serial"))]
pub async fn open_serial_async(
    _role: SensorRole,
    _port_path: &str,
    _baud_rate: u32,
) -> AppResult<DynSerial> {
    Err(DaqError::SerialFeatureDisabled)
}

#[derive(Debug, Clone)]
struct Endpoint {
    port: String,
    baud: u32,
}

/// A [`SensorLink`] over an async byte stream.
pub struct StreamLink {
    role: SensorRole,
    framing: Framing,
    endpoint: Option<Endpoint>,
    stream: Option<BufReader<DynSerial>>,
}

impl StreamLink {
    /// Link to a serial port, opened on [`connect`](SensorLink::connect).
    pub fn serial(role: SensorRole, framing: Framing, port: &str, baud: u32) -> Self {
        Self {
            role,
            framing,
            endpoint: Some(Endpoint {
                port: port.to_string(),
                baud,
            }),
            stream: None,
        }
    }

    /// Link over an already open stream.
    pub fn from_stream(role: SensorRole, framing: Framing, stream: DynSerial) -> Self {
        Self {
            role,
            framing,
            endpoint: None,
            stream: Some(BufReader::new(stream)),
        }
    }

    fn stream(&mut self) -> AppResult<&mut BufReader<DynSerial>> {
        self.stream.as_mut().ok_or(DaqError::SerialPortNotConnected)
    }
}

#[async_trait]
impl SensorLink for StreamLink {
    fn role(&self) -> SensorRole {
        self.role
    }

    async fn connect(&mut self) -> AppResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let Some(endpoint) = self.endpoint.clone() else {
            return Err(DaqError::LinkUnavailable {
                sensor: self.role,
                reason: "stream was closed and cannot be reopened".into(),
            });
        };
        let port = open_serial_async(self.role, &endpoint.port, endpoint.baud).await?;
        self.stream = Some(BufReader::new(port));
        info!(sensor = %self.role, port = %endpoint.port, baud = endpoint.baud, "connected");
        Ok(())
    }

    async fn read_frame(&mut self, timeout: Duration) -> AppResult<Vec<u8>> {
        let role = self.role;
        let framing = self.framing;
        let stream = self.stream()?;

        let result = match framing {
            Framing::Line => {
                let mut line = Vec::new();
                tokio::time::timeout(timeout, stream.read_until(b'\n', &mut line))
                    .await
                    .map(|r| {
                        r.and_then(|n| {
                            if n == 0 {
                                Err(std::io::ErrorKind::UnexpectedEof.into())
                            } else {
                                Ok(line)
                            }
                        })
                    })
            }
            Framing::PingProtocol => {
                tokio::time::timeout(timeout, ping1d::read_frame(stream)).await
            }
        };

        match result {
            Ok(Ok(mut frame)) => {
                if framing == Framing::Line {
                    while matches!(frame.last(), Some(b'\n' | b'\r')) {
                        frame.pop();
                    }
                }
                Ok(frame)
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(DaqError::LinkUnexpectedEof)
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(crate::error::DecodeError::PingFrame(e.to_string()).into())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(DaqError::Timeout {
                sensor: role,
                timeout,
            }),
        }
    }

    async fn send_command(&mut self, command: &[u8]) -> AppResult<()> {
        let port = self.stream()?.get_mut();
        port.write_all(command).await?;
        port.flush().await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> AppResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.get_mut().shutdown().await?;
            info!(sensor = %self.role, "disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn clear_input(&mut self) -> AppResult<()> {
        let stream = self.stream()?;
        let buffered = stream.buffer().len();
        stream.consume(buffered);

        let mut discard = [0u8; 256];
        let mut total = buffered;
        let port = stream.get_mut();
        // Stop at the first quiet 20 ms window.
        while let Ok(Ok(n)) =
            tokio::time::timeout(Duration::from_millis(20), port.read(&mut discard)).await
        {
            if n == 0 {
                break;
            }
            total += n;
        }
        if total > 0 {
            debug!(sensor = %self.role, bytes = total, "discarded stale input");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn line_frames_strip_terminator() {
        let (mut host, device) = tokio::io::duplex(256);
        let mut link = StreamLink::from_stream(SensorRole::Gnss, Framing::Line, Box::new(device));
        host.write_all(b"$GNGLL,1\r\n$GNGLL,2\r\n").await.unwrap();

        assert_eq!(link.read_frame(Duration::from_millis(50)).await.unwrap(), b"$GNGLL,1");
        assert_eq!(link.read_frame(Duration::from_millis(50)).await.unwrap(), b"$GNGLL,2");
    }

    #[tokio::test]
    async fn silent_stream_times_out() {
        let (_host, device) = tokio::io::duplex(64);
        let mut link = StreamLink::from_stream(SensorRole::Probe, Framing::Line, Box::new(device));
        let err = link.read_frame(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, DaqError::Timeout { sensor: SensorRole::Probe, .. }));
    }

    #[tokio::test]
    async fn closed_peer_is_eof() {
        let (host, device) = tokio::io::duplex(64);
        drop(host);
        let mut link = StreamLink::from_stream(SensorRole::Gnss, Framing::Line, Box::new(device));
        assert!(matches!(
            link.read_frame(Duration::from_millis(50)).await,
            Err(DaqError::LinkUnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn ping_frames_and_commands() {
        let (mut host, device) = tokio::io::duplex(256);
        let mut link =
            StreamLink::from_stream(SensorRole::Sonar, Framing::PingProtocol, Box::new(device));

        let request = ping1d::Packet::general_request(ping1d::ids::DISTANCE).encode();
        link.send_command(&request).await.unwrap();
        let mut written = vec![0u8; request.len()];
        tokio::io::AsyncReadExt::read_exact(&mut host, &mut written).await.unwrap();
        assert_eq!(written, request);

        let reply = ping1d::speed_of_sound_packet(1_500_000).encode();
        host.write_all(&reply).await.unwrap();
        assert_eq!(link.read_frame(Duration::from_millis(50)).await.unwrap(), reply);
    }

    #[tokio::test]
    async fn disconnected_link_cannot_reconnect_without_endpoint() {
        let (_host, device) = tokio::io::duplex(64);
        let mut link = StreamLink::from_stream(SensorRole::Gnss, Framing::Line, Box::new(device));
        link.disconnect().await.unwrap();
        assert!(!link.is_connected());
        assert!(matches!(
            link.read_frame(Duration::from_millis(10)).await,
            Err(DaqError::SerialPortNotConnected)
        ));
        assert!(matches!(
            link.connect().await,
            Err(DaqError::LinkUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn clear_input_discards_stale_bytes() {
        let (mut host, device) = tokio::io::duplex(256);
        let mut link = StreamLink::from_stream(SensorRole::Probe, Framing::Line, Box::new(device));
        host.write_all(b"1400000\r\n").await.unwrap();
        link.clear_input().await.unwrap();
        host.write_all(b"1482000\r\n").await.unwrap();
        assert_eq!(link.read_frame(Duration::from_millis(50)).await.unwrap(), b"1482000");
    }
}
