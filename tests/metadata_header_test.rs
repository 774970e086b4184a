//! Integration tests for the log header round trip.

use chrono::NaiveDate;
use sonar_daq::data::reader::{read_config_file, read_log_header};
use sonar_daq::data::storage::{write_meta_header, LogWriter, SIMPLE_COLUMNS};
use sonar_daq::error::DaqError;
use sonar_daq::metadata::{LogKind, Metadata, MetadataBuilder};
use std::io::Write;

fn survey() -> Metadata {
    MetadataBuilder::new("Harbour", NaiveDate::from_ymd_opt(2022, 6, 1).expect("valid date"))
        .location("Inner harbour, north basin")
        .vessel("Hydro1")
        .gnss_offset(1.25)
        .sonar_offset(-0.4)
        .default_sound_speed(1487.0)
        .gnss_port("/dev/ttyUSB0", 115200)
        .sonar_port("/dev/ttyUSB1", 115200)
        .svp_port("/dev/ttyUSB2", 9600)
        .build()
        .expect("valid survey")
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("Harbour_config.csv");
    let metadata = survey();

    write_meta_header(&path, LogKind::Config, &metadata).expect("header written");
    let read_back = read_config_file(&path).expect("header read");

    assert_eq!(read_back, metadata);
}

#[test]
fn test_simple_log_header_carries_columns() {
    let dir = tempfile::tempdir().expect("temp dir");
    let metadata = survey();
    let started = chrono::NaiveTime::from_hms_opt(10, 15, 0).expect("valid time");

    let writer = LogWriter::create_in(dir.path(), LogKind::SimpleLog, &metadata, started)
        .expect("log created");
    assert!(writer.path().ends_with("Harbour_simple_101500.csv"));

    let header = read_log_header(writer.path()).expect("header read");
    assert_eq!(header.kind, LogKind::SimpleLog);
    assert_eq!(header.metadata, metadata);
    assert_eq!(header.columns, Some(SIMPLE_COLUMNS.iter().map(|c| c.to_string()).collect()));
}

#[test]
fn test_truncated_header_is_a_format_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("broken.csv");
    let mut file = std::fs::File::create(&path).expect("file created");
    writeln!(file, "OSP_RAW_LOG\nHeader_Start\nSurvey,Harbour,Somewhere,2022-06-01\nHeader_End")
        .expect("written");

    assert!(matches!(read_log_header(&path), Err(DaqError::LogFormat(_))));
}

#[test]
fn test_original_datetime_survey_date_accepted() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("legacy.csv");
    write_meta_header(&path, LogKind::Config, &survey()).expect("header written");

    let text = std::fs::read_to_string(&path).expect("read");
    let legacy = text.replace("2022-06-01", "2022-06-01 00:00:00");
    std::fs::write(&path, legacy).expect("rewritten");

    let read_back = read_config_file(&path).expect("legacy header read");
    assert_eq!(read_back.survey.date, NaiveDate::from_ymd_opt(2022, 6, 1).expect("valid date"));
}
