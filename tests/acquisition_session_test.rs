//! Acquisition over scripted sensor links, followed by a processing pass.

use chrono::NaiveDate;
use sonar_daq::acquisition::{AcquisitionSession, Sensors, SoundSpeedSource};
use sonar_daq::config::Settings;
use sonar_daq::data::reader::read_raw_log;
use sonar_daq::error::{DaqError, SensorRole};
use sonar_daq::hardware::mock::{ping_responder, MockLink};
use sonar_daq::metadata::{Metadata, MetadataBuilder};
use sonar_daq::processing::extract_soundings;
use std::path::Path;
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};

const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,10.0,M,0.0,M,,*4D";
const RMC: &str = "$GNRMC,123520.00,A,4807.038,N,01131.000,E,2.5,84.4,010622,,,A";
const GLL: &str = "$GNGLL,4807.038,N,01131.000,E,123521.00,A,A";
const BAD: &str = "$GNGLL,4807.038,N,01131.000,E,123521.00,A,A*00";

fn metadata() -> Metadata {
    MetadataBuilder::new("Harbour", NaiveDate::from_ymd_opt(2022, 6, 1).expect("valid date"))
        .sonar_offset(-0.5)
        .gnss_port("/dev/ttyUSB0", 115200)
        .sonar_port("/dev/ttyUSB1", 115200)
        .svp_port("/dev/ttyUSB2", 9600)
        .build()
        .expect("valid survey")
}

fn fast_settings(output_dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.acquisition.gnss_timeout_ms = 5;
    settings.acquisition.sonar_timeout_ms = 5;
    settings.acquisition.probe_timeout_ms = 5;
    settings.storage.output_dir = output_dir.to_path_buf();
    settings
}

#[tokio::test]
async fn test_acquired_raw_log_processes_into_soundings() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = fast_settings(dir.path());

    let gnss = MockLink::new(SensorRole::Gnss)
        .with_line(GGA)
        .with_line(BAD)
        .with_line(RMC)
        .with_line(GGA)
        .with_silence()
        .with_line(GLL)
        .with_line(GGA);
    let sonar = MockLink::new(SensorRole::Sonar).with_responder(ping_responder(7250));
    let sensors = Sensors::from_links(Box::new(gnss), Box::new(sonar), None, &settings.acquisition);

    let session = AcquisitionSession::start(
        metadata(),
        &settings,
        sensors,
        SoundSpeedSource::Manual(1480.0),
    )
    .await
    .expect("session started");
    assert_eq!(session.current_sound_speed(), 1480.0);
    let raw_path = session.raw_log_path().to_path_buf();

    let (tx, rx) = oneshot::channel();
    let run = tokio::spawn(session.run(rx));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    tx.send(()).expect("session still running");
    let summary = assert_ok!(run.await.expect("task joined"));

    assert_eq!(summary.sentences, 5);
    assert_eq!(summary.pings, 5);
    assert_eq!(summary.simple_rows, 3);

    let log = read_raw_log(&raw_path).expect("raw log read");
    assert_eq!(log.records.len(), 10);
    let soundings = extract_soundings(&log.header.metadata, &log.records);
    assert_eq!(soundings.len(), 3);
    for (i, sounding) in soundings.iter().enumerate() {
        assert_eq!(sounding.sequence_number, i as u64);
        assert!((sounding.water_depth - -7.75).abs() < 1e-9);
        assert_eq!(sounding.sound_speed, 1480.0);
    }
    // The RMC ahead of the second GGA supplied motion.
    assert_eq!(soundings[1].speed_over_ground, Some(2.5));
}

#[tokio::test]
async fn test_unplugged_gnss_aborts_start() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = fast_settings(dir.path());
    let probe = MockLink::new(SensorRole::Probe);
    let probe_handle = probe.handle();
    let sensors = Sensors::from_links(
        Box::new(MockLink::new(SensorRole::Gnss).unplugged()),
        Box::new(MockLink::new(SensorRole::Sonar)),
        Some(Box::new(probe)),
        &settings.acquisition,
    );

    let result =
        AcquisitionSession::start(metadata(), &settings, sensors, SoundSpeedSource::Default).await;
    let error = assert_err!(result);
    assert!(matches!(
        error,
        DaqError::LinkUnavailable {
            sensor: SensorRole::Gnss,
            ..
        }
    ));
    assert!(!error.is_recoverable());
    assert!(!probe_handle.is_connected());
    // No log files are created for a session that never started.
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
}
