//! Post-processing of raw logs.
//!
//! Runs as a separate pass over a finished raw log:
//! raw rows -> [`soundings`] / [`dop`] -> [`profile`] correction -> [`editor`].
pub mod dop;
pub mod editor;
pub mod profile;
pub mod soundings;

pub use dop::{extract_dops, DopSample};
pub use editor::{Extent, SoundingEditor};
pub use profile::SoundSpeedProfile;
pub use soundings::{extract_soundings, Sounding, SoundingExtractor};
