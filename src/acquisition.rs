//! Acquisition session and polling loop.
//!
//! A session owns the three sensor drivers and the two open log files. It is
//! brought up in a fixed order (GNSS, sonar, probe), pushes the chosen sound
//! speed to the sonar, then polls one cycle at a time:
//!
//! 1. every `resync_interval` cycles, when the probe drives the sound speed,
//!    re-read the probe and push the value to the sonar
//! 2. read one GNSS sentence and append it to the raw log
//! 3. on a GGA/RMC/GLL fix, ping the sonar and append the ping row
//! 4. on a GGA fix, append the synchronized row to the simplified log
//!
//! Decode failures and timeouts end the cycle early and are never fatal.
//! The loop runs until the shutdown channel fires; tear-down releases every
//! link whatever path led there.

use crate::config::{AcquisitionConfig, Settings};
use crate::data::storage::{raw_gnss_row, raw_ping_row, LogWriter, SimpleRecord};
use crate::error::{AppResult, DaqError, SensorRole};
use crate::hardware::{
    Framing, GnssReceiver, PingSonar, SensorLink, SoundSpeedProbe, StreamLink,
};
use crate::metadata::{LogKind, Metadata};
use crate::nmea::{Fix, MessageKind, NmeaSentence};
use crate::validation::is_in_range;
use chrono::{NaiveTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

// =============================================================================
// Sound Speed Source
// =============================================================================

/// Where the operating sound speed comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SoundSpeedSource {
    /// Surface probe, re-read periodically during the survey.
    Probe,
    /// The SVP default recorded in the survey metadata.
    Default,
    /// Operator-entered value in m/s.
    Manual(f64),
}

impl FromStr for SoundSpeedSource {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "probe" => Ok(SoundSpeedSource::Probe),
            "default" => Ok(SoundSpeedSource::Default),
            other => other.parse().map(SoundSpeedSource::Manual).map_err(|_| {
                DaqError::Configuration(format!(
                    "Invalid sound speed source '{}'. Use probe, default or a value in m/s",
                    other
                ))
            }),
        }
    }
}

// =============================================================================
// Sensors
// =============================================================================

/// The three sensor drivers of one survey platform.
pub struct Sensors {
    /// Position source; every cycle starts with one of its sentences.
    pub gnss: GnssReceiver,
    /// Single-beam echo sounder.
    pub sonar: PingSonar,
    /// Optional; a survey runs without it at a fixed sound speed.
    pub probe: Option<SoundSpeedProbe>,
}

impl Sensors {
    /// Wrap already-built links with the configured timeouts.
    pub fn from_links(
        gnss: Box<dyn SensorLink>,
        sonar: Box<dyn SensorLink>,
        probe: Option<Box<dyn SensorLink>>,
        config: &AcquisitionConfig,
    ) -> Self {
        Self {
            gnss: GnssReceiver::new(gnss, config.gnss_timeout(), config.max_decode_attempts),
            sonar: PingSonar::new(sonar, config.sonar_timeout(), config.max_decode_attempts),
            probe: probe.map(|link| SoundSpeedProbe::new(link, config.probe_timeout())),
        }
    }

    /// Serial links on the ports named in the survey metadata.
    pub fn serial(metadata: &Metadata, config: &AcquisitionConfig) -> Self {
        let gnss = StreamLink::serial(
            SensorRole::Gnss,
            Framing::Line,
            &metadata.gnss_com.port,
            metadata.gnss_com.baud,
        );
        let sonar = StreamLink::serial(
            SensorRole::Sonar,
            Framing::PingProtocol,
            &metadata.sonar_com.port,
            metadata.sonar_com.baud,
        );
        let probe = StreamLink::serial(
            SensorRole::Probe,
            Framing::Line,
            &metadata.svp_com.port,
            metadata.svp_com.baud,
        );
        Self::from_links(Box::new(gnss), Box::new(sonar), Some(Box::new(probe)), config)
    }

    /// Connect GNSS, sonar, then probe.
    ///
    /// A probe failure only drops the probe. A GNSS or sonar failure releases
    /// every link and is returned.
    async fn connect(&mut self) -> AppResult<()> {
        let required = async {
            self.gnss.connect().await?;
            info!("GNSS connected");
            self.sonar.connect().await?;
            info!("Sonar connected");
            Ok::<(), DaqError>(())
        }
        .await;
        if let Err(e) = required {
            error!("Sensor bring-up failed: {}", e);
            if let Err(release) = self.disconnect().await {
                warn!("Release after failed bring-up: {}", release);
            }
            return Err(e);
        }

        if let Some(probe) = self.probe.as_mut() {
            match probe.connect().await {
                Ok(()) => info!("Sound speed probe connected"),
                Err(e) => {
                    warn!("Sound speed probe unavailable, continuing without it: {}", e);
                    self.probe = None;
                }
            }
        }
        Ok(())
    }

    /// Disconnect every link, collecting failures.
    async fn disconnect(&mut self) -> AppResult<()> {
        let mut errors = Vec::new();
        if let Err(e) = self.gnss.disconnect().await {
            errors.push(e);
        }
        if let Err(e) = self.sonar.disconnect().await {
            errors.push(e);
        }
        if let Some(probe) = self.probe.as_mut() {
            if let Err(e) = probe.disconnect().await {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DaqError::ShutdownFailed(errors))
        }
    }
}

impl std::fmt::Debug for Sensors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensors")
            .field("gnss_connected", &self.gnss.is_connected())
            .field("sonar", &self.sonar)
            .field("probe", &self.probe.is_some())
            .finish()
    }
}

// =============================================================================
// Session
// =============================================================================

/// What one cycle produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No sentence could be read this cycle.
    NoSentence,
    /// A sentence was logged; it was not a fix or the ping failed.
    Logged(MessageKind),
    /// A fix was logged together with its ping.
    Sounded { kind: MessageKind, simple_row: bool },
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Completed cycles, including ones that read nothing.
    pub cycles: u64,
    /// GNSS sentences written to the raw log.
    pub sentences: u64,
    /// `$DEPTH` rows written to the raw log.
    pub pings: u64,
    /// Rows written to the simplified log.
    pub simple_rows: u64,
    /// Successful probe resyncs.
    pub resyncs: u64,
}

/// A running survey that owns the connected sensors and both open logs.
pub struct AcquisitionSession {
    metadata: Metadata,
    config: AcquisitionConfig,
    sensors: Sensors,
    raw_log: LogWriter,
    simple_log: LogWriter,
    current_sound_speed: f64,
    auto_update: bool,
    cycles_since_resync: u32,
    summary: SessionSummary,
}

impl AcquisitionSession {
    /// Bring the sensors up, set the sonar sound speed and open both logs in
    /// `settings.storage.output_dir`.
    ///
    /// # Errors
    /// Any failure after the links are connected releases them before
    /// returning.
    pub async fn start(
        metadata: Metadata,
        settings: &Settings,
        mut sensors: Sensors,
        source: SoundSpeedSource,
    ) -> AppResult<Self> {
        let config = settings.acquisition.clone();
        if let SoundSpeedSource::Manual(speed) = source {
            let range = config.manual_sound_speed_min..=config.manual_sound_speed_max;
            is_in_range(speed, range).map_err(|reason| {
                DaqError::SoundSpeedSource(format!(
                    "manual sound speed {} m/s rejected: {}",
                    speed, reason
                ))
            })?;
        }

        info!("Starting acquisition for survey '{}'", metadata.survey.name);
        sensors.connect().await?;

        match Self::open(metadata, config, sensors, source, &settings.storage.output_dir).await {
            Ok(session) => Ok(session),
            Err((mut sensors, e)) => {
                if let Err(release) = sensors.disconnect().await {
                    warn!("Release after failed start: {}", release);
                }
                Err(e)
            }
        }
    }

    async fn open(
        metadata: Metadata,
        config: AcquisitionConfig,
        mut sensors: Sensors,
        source: SoundSpeedSource,
        output_dir: &Path,
    ) -> Result<Self, (Sensors, DaqError)> {
        let (requested, auto_update) = match initial_sound_speed(&mut sensors, &metadata, source).await {
            Ok(selection) => selection,
            Err(e) => return Err((sensors, e)),
        };

        let current_sound_speed = match apply_sound_speed(&mut sensors.sonar, requested).await {
            Ok(speed) => speed,
            Err(e) => return Err((sensors, e)),
        };

        let started = Utc::now().time();
        let logs = LogWriter::create_in(output_dir, LogKind::RawLog, &metadata, started).and_then(
            |raw| {
                LogWriter::create_in(output_dir, LogKind::SimpleLog, &metadata, started)
                    .map(|simple| (raw, simple))
            },
        );
        let (raw_log, simple_log) = match logs {
            Ok(logs) => logs,
            Err(e) => return Err((sensors, e)),
        };

        info!(
            sound_speed = current_sound_speed,
            auto_update, "Acquisition session ready"
        );
        Ok(Self {
            metadata,
            config,
            sensors,
            raw_log,
            simple_log,
            current_sound_speed,
            auto_update,
            cycles_since_resync: 0,
            summary: SessionSummary::default(),
        })
    }

    /// Sound speed (m/s) the sonar is currently using.
    pub fn current_sound_speed(&self) -> f64 {
        self.current_sound_speed
    }

    /// Whether the probe re-derives the sound speed during the survey.
    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    /// Path of the raw log.
    pub fn raw_log_path(&self) -> &Path {
        self.raw_log.path()
    }

    /// Path of the simplified log.
    pub fn simple_log_path(&self) -> &Path {
        self.simple_log.path()
    }

    /// Counters so far.
    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    /// Run one acquisition cycle.
    ///
    /// # Errors
    /// Only unrecoverable failures (log I/O, a link that went away) are
    /// returned; decode failures and timeouts yield
    /// [`CycleOutcome::NoSentence`] or [`CycleOutcome::Logged`].
    pub async fn cycle(&mut self) -> AppResult<CycleOutcome> {
        self.summary.cycles += 1;
        if self.auto_update {
            self.cycles_since_resync += 1;
            if self.cycles_since_resync >= self.config.resync_interval {
                self.resync().await;
                self.cycles_since_resync = 0;
            }
        }

        let sentence = match self.sensors.gnss.next_sentence().await {
            Ok(sentence) => sentence,
            Err(e) if e.is_recoverable() => {
                debug!("No GNSS sentence this cycle: {}", e);
                return Ok(CycleOutcome::NoSentence);
            }
            Err(e) => return Err(e),
        };
        self.raw_log.write_row(raw_gnss_row(now(), &sentence))?;
        self.summary.sentences += 1;

        if !sentence.kind.is_fix() {
            return Ok(CycleOutcome::Logged(sentence.kind));
        }

        let report = match self.sensors.sonar.ping().await {
            Ok(report) => report,
            Err(e) if e.is_recoverable() => {
                warn!("Sonar ping failed: {}", e);
                return Ok(CycleOutcome::Logged(sentence.kind));
            }
            Err(e) => return Err(e),
        };
        self.raw_log
            .write_row(raw_ping_row(now(), &report, self.current_sound_speed))?;
        self.summary.pings += 1;

        let simple_row = if sentence.kind == MessageKind::Gga {
            self.write_simple(&sentence, f64::from(report.distance_mm) / 1000.0)?
        } else {
            false
        };
        Ok(CycleOutcome::Sounded {
            kind: sentence.kind,
            simple_row,
        })
    }

    fn write_simple(&mut self, sentence: &NmeaSentence, distance: f64) -> AppResult<bool> {
        let fix = match Fix::from_sentence(sentence) {
            Ok(fix) => fix,
            Err(e) => {
                warn!("GGA not usable for the simplified log: {}", e);
                return Ok(false);
            }
        };
        let (Some(latitude), Some(longitude), Some(antenna), Some(separation)) = (
            fix.latitude,
            fix.longitude,
            fix.antenna_height,
            fix.geoid_separation,
        ) else {
            warn!("GGA without position or heights, simplified row skipped");
            return Ok(false);
        };

        let water_depth = distance + self.metadata.sonar.waterline_offset;
        let record = SimpleRecord {
            time: now(),
            latitude,
            longitude,
            water_depth,
            bottom_height: antenna + separation
                - water_depth
                - self.metadata.gnss.waterline_offset,
            sound_speed: self.current_sound_speed,
        };
        self.simple_log.write_row(record.to_row())?;
        self.summary.simple_rows += 1;
        Ok(true)
    }

    /// Re-read the probe and push the reading to the sonar. The previous
    /// speed stays in force on any failure.
    async fn resync(&mut self) {
        let Some(probe) = self.sensors.probe.as_mut() else {
            return;
        };
        let speed = match probe.read_sound_speed().await {
            Ok(speed) => speed,
            Err(e) => {
                warn!(
                    "Probe resync failed, keeping {} m/s: {}",
                    self.current_sound_speed, e
                );
                return;
            }
        };
        match self.sensors.sonar.set_sound_speed(speed).await {
            Ok(()) => {
                info!("Sound speed resynced to {} m/s", speed);
                self.current_sound_speed = speed;
                self.summary.resyncs += 1;
            }
            Err(e) => warn!(
                "Sonar refused resynced sound speed, keeping {} m/s: {}",
                self.current_sound_speed, e
            ),
        }
    }

    /// Poll until `shutdown` fires (or its sender is dropped), then tear down.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> AppResult<SessionSummary> {
        let outcome = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                result = self.cycle() => {
                    if let Err(e) = result {
                        error!("Acquisition stopped: {}", e);
                        break Err(e);
                    }
                }
            }
        };
        let summary = self.summary;
        let teardown = self.shutdown().await;
        outcome?;
        teardown?;
        Ok(summary)
    }

    /// Flush both logs and release every link.
    pub async fn shutdown(mut self) -> AppResult<()> {
        info!(
            cycles = self.summary.cycles,
            pings = self.summary.pings,
            "Stopping acquisition"
        );
        let mut errors = Vec::new();
        if let Err(e) = self.raw_log.flush() {
            errors.push(e);
        }
        if let Err(e) = self.simple_log.flush() {
            errors.push(e);
        }
        match self.sensors.disconnect().await {
            Ok(()) => {}
            Err(DaqError::ShutdownFailed(link_errors)) => errors.extend(link_errors),
            Err(e) => errors.push(e),
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DaqError::ShutdownFailed(errors))
        }
    }
}

impl std::fmt::Debug for AcquisitionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("survey", &self.metadata.survey.name)
            .field("sensors", &self.sensors)
            .field("current_sound_speed", &self.current_sound_speed)
            .field("auto_update", &self.auto_update)
            .field("summary", &self.summary)
            .finish()
    }
}

fn now() -> NaiveTime {
    Utc::now().time()
}

/// Requested speed and whether the probe keeps it up to date.
async fn initial_sound_speed(
    sensors: &mut Sensors,
    metadata: &Metadata,
    source: SoundSpeedSource,
) -> AppResult<(f64, bool)> {
    let default = metadata.svp.default_sound_speed;
    match source {
        SoundSpeedSource::Manual(speed) => Ok((speed, false)),
        SoundSpeedSource::Default => Ok((default, false)),
        SoundSpeedSource::Probe => match sensors.probe.as_mut() {
            None => {
                warn!(
                    "Probe selected but not connected, using default {} m/s",
                    default
                );
                Ok((default, false))
            }
            Some(probe) => match probe.read_sound_speed().await {
                Ok(speed) => Ok((speed, true)),
                Err(e) => {
                    warn!(
                        "First probe reading failed, starting at default {} m/s: {}",
                        default, e
                    );
                    Ok((default, true))
                }
            },
        },
    }
}

/// Push `speed` to the sonar and return what the sonar reports back.
async fn apply_sound_speed(sonar: &mut PingSonar, speed: f64) -> AppResult<f64> {
    sonar.set_sound_speed(speed).await?;
    sonar.sound_speed().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reader::{read_log_header, read_raw_log};
    use crate::hardware::mock::{ping_responder, MockHandle, MockLink};
    use crate::metadata::MetadataBuilder;
    use chrono::NaiveDate;
    use std::time::Duration;
    use tracing_test::traced_test;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,10.0,M,0.0,M,,*4D";
    const GSA: &str = "$GNGSA,A,3,10,07,05,02,29,04,08,13,,,,,1.72,1.03,1.38";
    const GLL: &str = "$GNGLL,4807.038,N,01131.000,E,123520.00,A,A";

    fn metadata() -> Metadata {
        MetadataBuilder::new("Harbour", NaiveDate::from_ymd_opt(2022, 6, 1).unwrap())
            .gnss_offset(0.0)
            .sonar_offset(-0.5)
            .gnss_port("gnss", 115200)
            .sonar_port("sonar", 115200)
            .svp_port("svp", 9600)
            .build()
            .unwrap()
    }

    fn settings(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.acquisition.gnss_timeout_ms = 5;
        settings.acquisition.sonar_timeout_ms = 5;
        settings.acquisition.probe_timeout_ms = 5;
        settings.acquisition.max_decode_attempts = 3;
        settings.storage.output_dir = dir.to_path_buf();
        settings
    }

    struct Rig {
        sensors: Sensors,
        gnss: MockHandle,
        sonar: MockHandle,
        probe: MockHandle,
    }

    fn rig(gnss: MockLink, probe: MockLink, settings: &Settings) -> Rig {
        let sonar = MockLink::new(SensorRole::Sonar).with_responder(ping_responder(5000));
        let (g, s, p) = (gnss.handle(), sonar.handle(), probe.handle());
        Rig {
            sensors: Sensors::from_links(
                Box::new(gnss),
                Box::new(sonar),
                Some(Box::new(probe)),
                &settings.acquisition,
            ),
            gnss: g,
            sonar: s,
            probe: p,
        }
    }

    #[test]
    fn source_parsing() {
        assert_eq!("probe".parse::<SoundSpeedSource>().unwrap(), SoundSpeedSource::Probe);
        assert_eq!(
            "1487.5".parse::<SoundSpeedSource>().unwrap(),
            SoundSpeedSource::Manual(1487.5)
        );
        assert!("fast".parse::<SoundSpeedSource>().is_err());
    }

    #[tokio::test]
    async fn gga_cycle_logs_fix_ping_and_simple_row() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let gnss = MockLink::new(SensorRole::Gnss)
            .with_line(GGA)
            .with_line(GSA)
            .with_line(GLL);
        let rig = rig(gnss, MockLink::new(SensorRole::Probe), &settings);

        let mut session = AcquisitionSession::start(
            metadata(),
            &settings,
            rig.sensors,
            SoundSpeedSource::Default,
        )
        .await
        .unwrap();
        assert_eq!(session.current_sound_speed(), 1500.0);
        assert!(!session.auto_update());

        assert_eq!(
            session.cycle().await.unwrap(),
            CycleOutcome::Sounded {
                kind: MessageKind::Gga,
                simple_row: true
            }
        );
        assert_eq!(
            session.cycle().await.unwrap(),
            CycleOutcome::Logged(MessageKind::Gsa)
        );
        assert_eq!(
            session.cycle().await.unwrap(),
            CycleOutcome::Sounded {
                kind: MessageKind::Gll,
                simple_row: false
            }
        );
        assert_eq!(session.cycle().await.unwrap(), CycleOutcome::NoSentence);

        let raw_path = session.raw_log_path().to_path_buf();
        let simple_path = session.simple_log_path().to_path_buf();
        session.shutdown().await.unwrap();
        assert!(!rig.gnss.is_connected());
        assert!(!rig.sonar.is_connected());
        assert!(!rig.probe.is_connected());

        let raw = read_raw_log(&raw_path).unwrap();
        let tags: Vec<&str> = raw.records.iter().map(|r| r.tag()).collect();
        assert_eq!(tags, vec!["$GPGGA", "$DEPTH", "$GNGSA", "$GNGLL", "$DEPTH"]);
        assert_eq!(raw.records[1].from_end(1).and_then(|v| v.as_f64()), Some(1500.0));

        let simple = std::fs::read_to_string(&simple_path).unwrap();
        let last = simple.lines().last().unwrap();
        let fields: Vec<&str> = last.split(',').collect();
        // 5.000 m - 0.5 m draft; 10.0 + 0.0 - 4.5 - 0.0
        assert_eq!(fields[3], "4.5");
        assert_eq!(fields[4], "5.5");
        assert_eq!(read_log_header(&simple_path).unwrap().kind, LogKind::SimpleLog);
    }

    #[tokio::test]
    async fn manual_speed_outside_range_rejected_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let rig = rig(
            MockLink::new(SensorRole::Gnss),
            MockLink::new(SensorRole::Probe),
            &settings,
        );
        let result = AcquisitionSession::start(
            metadata(),
            &settings,
            rig.sensors,
            SoundSpeedSource::Manual(1200.0),
        )
        .await;
        assert!(matches!(result, Err(DaqError::SoundSpeedSource(_))));
        assert_eq!(rig.gnss.connects(), 0);
    }

    #[tokio::test]
    async fn sonar_failure_releases_other_links() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let gnss = MockLink::new(SensorRole::Gnss);
        let sonar = MockLink::new(SensorRole::Sonar).unplugged();
        let probe = MockLink::new(SensorRole::Probe);
        let (g, p) = (gnss.handle(), probe.handle());
        let sensors = Sensors::from_links(
            Box::new(gnss),
            Box::new(sonar),
            Some(Box::new(probe)),
            &settings.acquisition,
        );

        let result =
            AcquisitionSession::start(metadata(), &settings, sensors, SoundSpeedSource::Default)
                .await;
        assert!(matches!(
            result,
            Err(DaqError::LinkUnavailable {
                sensor: SensorRole::Sonar,
                ..
            })
        ));
        assert_eq!(g.disconnects(), 1);
        assert!(!p.is_connected());
    }

    #[tokio::test]
    async fn unplugged_probe_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let rig = rig(
            MockLink::new(SensorRole::Gnss),
            MockLink::new(SensorRole::Probe).unplugged(),
            &settings,
        );
        let session =
            AcquisitionSession::start(metadata(), &settings, rig.sensors, SoundSpeedSource::Probe)
                .await
                .unwrap();
        assert!(!session.auto_update());
        assert_eq!(session.current_sound_speed(), 1500.0);
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_probe_resync_keeps_previous_speed() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.acquisition.resync_interval = 2;
        let gnss = MockLink::new(SensorRole::Gnss).with_line(GLL).with_line(GLL);
        // First reading at start-up, then junk at the resync.
        let probe = MockLink::new(SensorRole::Probe)
            .with_line("1482500")
            .with_line("not a number");
        let rig = rig(gnss, probe, &settings);

        let mut session =
            AcquisitionSession::start(metadata(), &settings, rig.sensors, SoundSpeedSource::Probe)
                .await
                .unwrap();
        assert!(session.auto_update());
        assert_eq!(session.current_sound_speed(), 1482.5);

        session.cycle().await.unwrap();
        session.cycle().await.unwrap();
        assert_eq!(session.current_sound_speed(), 1482.5);
        assert_eq!(session.summary().resyncs, 0);
        assert!(logs_contain("Probe resync failed"));
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn probe_resync_updates_sonar() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.acquisition.resync_interval = 1;
        let gnss = MockLink::new(SensorRole::Gnss).with_line(GLL);
        let probe = MockLink::new(SensorRole::Probe)
            .with_line("1482500")
            .with_line("1490000");
        let rig = rig(gnss, probe, &settings);

        let mut session =
            AcquisitionSession::start(metadata(), &settings, rig.sensors, SoundSpeedSource::Probe)
                .await
                .unwrap();
        session.cycle().await.unwrap();
        assert_eq!(session.current_sound_speed(), 1490.0);
        assert_eq!(session.summary().resyncs, 1);
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let gnss = MockLink::new(SensorRole::Gnss).with_line(GGA).with_line(GGA);
        let rig = rig(gnss, MockLink::new(SensorRole::Probe), &settings);

        let session =
            AcquisitionSession::start(metadata(), &settings, rig.sensors, SoundSpeedSource::Default)
                .await
                .unwrap();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(session.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.pings, 2);
        assert_eq!(summary.simple_rows, 2);
        assert!(!rig.sonar.is_connected());
    }
}
