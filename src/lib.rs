//! # Sonar DAQ Core Library
//!
//! Acquisition and post-processing for a single-beam hydrographic survey
//! platform: a GNSS receiver, a single-beam echo sounder and a surface
//! sound-speed probe, each reached over a serial link.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: Session bring-up and the polling loop that writes the
//!   raw and simplified logs.
//! - **`config`**: Application settings loaded with figment from TOML and
//!   `SONAR_DAQ_` environment variables. See `config::Settings`.
//! - **`data`**: Log file writers (`data::storage`) and the raw log reader
//!   (`data::reader`).
//! - **`error`**: The `DaqError` enum shared by every module.
//! - **`hardware`**: The `SensorLink` capability, its serial and mock
//!   implementations, and the three sensor drivers.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`metadata`**: Survey metadata carried in every log header.
//! - **`nmea`**: Message decoding for GNSS sentences and probe readings.
//! - **`processing`**: Sounding and DOP extraction, sound-speed correction and
//!   sounding editing over a finished raw log.
//! - **`validation`**: Small validators shared by `config` and `metadata`.
//!
//! Acquisition and processing never run concurrently: the raw log file is
//! the only hand-off between them.

pub mod acquisition;
pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod metadata;
pub mod nmea;
pub mod processing;
pub mod validation;
