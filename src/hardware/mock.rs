//! Mock Hardware Implementations
//!
//! [`MockLink`] is a scripted [`SensorLink`] for exercising the drivers and the
//! acquisition loop without a vessel:
//! - queued frames are returned in order, an empty queue reads as a timeout
//! - an optional responder turns each command into reply frames
//! - a [`MockHandle`] keeps an eye on the link after it has been boxed away
//!
//! [`ping_responder`] simulates a Ping-protocol sonar on top of it.

use crate::error::{AppResult, DaqError, SensorRole};
use crate::hardware::ping1d::{self, ids, DistanceReport, Packet};
use crate::hardware::SensorLink;
use async_trait::async_trait;
use bytes::Buf;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Turns one command into zero or more reply frames.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// One scripted read.
#[derive(Debug, Clone)]
pub enum MockFrame {
    Data(Vec<u8>),
    /// The sensor stays silent for this read.
    Silence,
}

#[derive(Debug, Default)]
struct MockState {
    frames: VecDeque<MockFrame>,
    sent: Vec<Vec<u8>>,
    connected: bool,
    connects: u32,
    disconnects: u32,
}

/// Shared view of a [`MockLink`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a frame for a later read.
    pub fn push_frame(&self, frame: impl Into<Vec<u8>>) {
        self.lock().frames.push_back(MockFrame::Data(frame.into()));
    }

    /// Commands written so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn disconnects(&self) -> u32 {
        self.lock().disconnects
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    /// Frames not yet read.
    pub fn pending(&self) -> usize {
        self.lock().frames.len()
    }
}

/// Scripted sensor link.
pub struct MockLink {
    role: SensorRole,
    state: Arc<Mutex<MockState>>,
    responder: Option<Responder>,
    fail_connect: bool,
}

impl MockLink {
    pub fn new(role: SensorRole) -> Self {
        Self {
            role,
            state: Arc::new(Mutex::new(MockState::default())),
            responder: None,
            fail_connect: false,
        }
    }

    /// Queue a frame.
    pub fn with_frame(self, frame: impl Into<Vec<u8>>) -> Self {
        self.handle().push_frame(frame);
        self
    }

    /// Queue a line of text as a frame.
    pub fn with_line(self, line: &str) -> Self {
        self.with_frame(line.as_bytes().to_vec())
    }

    /// Queue a silent read.
    pub fn with_silence(self) -> Self {
        self.handle().lock().frames.push_back(MockFrame::Silence);
        self
    }

    pub fn with_responder(
        mut self,
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Make `connect` fail as if the device were unplugged.
    pub fn unplugged(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SensorLink for MockLink {
    fn role(&self) -> SensorRole {
        self.role
    }

    async fn connect(&mut self) -> AppResult<()> {
        if self.fail_connect {
            return Err(DaqError::LinkUnavailable {
                sensor: self.role,
                reason: "mock device unplugged".into(),
            });
        }
        let mut state = self.lock();
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn read_frame(&mut self, timeout: Duration) -> AppResult<Vec<u8>> {
        let next = {
            let mut state = self.lock();
            if !state.connected {
                return Err(DaqError::SerialPortNotConnected);
            }
            state.frames.pop_front()
        };
        match next {
            Some(MockFrame::Data(frame)) => Ok(frame),
            Some(MockFrame::Silence) | None => {
                tokio::time::sleep(timeout).await;
                Err(DaqError::Timeout {
                    sensor: self.role,
                    timeout,
                })
            }
        }
    }

    async fn send_command(&mut self, command: &[u8]) -> AppResult<()> {
        let replies = self
            .responder
            .as_mut()
            .map(|respond| respond(command))
            .unwrap_or_default();
        let mut state = self.lock();
        if !state.connected {
            return Err(DaqError::SerialPortNotConnected);
        }
        state.sent.push(command.to_vec());
        state
            .frames
            .extend(replies.into_iter().map(MockFrame::Data));
        Ok(())
    }

    async fn disconnect(&mut self) -> AppResult<()> {
        let mut state = self.lock();
        if state.connected {
            state.connected = false;
            state.disconnects += 1;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }
}

/// Simulated Ping-protocol sonar that always sees the bottom at `distance_mm`.
///
/// Answers distance and speed-of-sound requests and acknowledges
/// `set_speed_of_sound`.
pub fn ping_responder(distance_mm: u32) -> impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send {
    let mut speed_mm_per_s: u32 = 1_500_000;
    let mut ping_number: u32 = 0;
    move |command| {
        let Ok(packet) = Packet::parse(command) else {
            return Vec::new();
        };
        let mut payload = packet.payload.clone();
        let reply = match packet.message_id {
            ids::GENERAL_REQUEST if payload.remaining() >= 2 => match payload.get_u16_le() {
                ids::DISTANCE => {
                    ping_number += 1;
                    DistanceReport {
                        distance_mm,
                        confidence: 100,
                        transmit_duration: 50,
                        ping_number,
                        scan_start: 0,
                        scan_length: distance_mm.saturating_mul(2),
                        gain_setting: 1,
                    }
                    .to_packet()
                }
                ids::SPEED_OF_SOUND => ping1d::speed_of_sound_packet(speed_mm_per_s),
                _ => return Vec::new(),
            },
            ids::SET_SPEED_OF_SOUND if payload.remaining() >= 4 => {
                speed_mm_per_s = payload.get_u32_le();
                ping1d::ack_packet(ids::SET_SPEED_OF_SOUND)
            }
            _ => return Vec::new(),
        };
        vec![reply.encode()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_frames_then_timeout() {
        let mut link = MockLink::new(SensorRole::Gnss).with_line("$GNGLL").with_silence();
        link.connect().await.unwrap();
        assert_eq!(link.read_frame(Duration::from_millis(1)).await.unwrap(), b"$GNGLL");
        assert!(matches!(
            link.read_frame(Duration::from_millis(1)).await,
            Err(DaqError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn handle_observes_boxed_link() {
        let link = MockLink::new(SensorRole::Probe);
        let handle = link.handle();
        let mut boxed: Box<dyn SensorLink> = Box::new(link);

        boxed.connect().await.unwrap();
        boxed.send_command(b"?").await.unwrap();
        boxed.disconnect().await.unwrap();
        boxed.disconnect().await.unwrap();

        assert_eq!(handle.sent(), vec![b"?".to_vec()]);
        assert_eq!(handle.disconnects(), 1);
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn unplugged_link_refuses_connect() {
        let mut link = MockLink::new(SensorRole::Sonar).unplugged();
        assert!(matches!(
            link.connect().await,
            Err(DaqError::LinkUnavailable { sensor: SensorRole::Sonar, .. })
        ));
    }
}
