//! Sound-Speed Profile Engine
//!
//! Consecutive profile samples bound layers of constant sound-speed gradient.
//! The one-way travel time through a layer of gradient `g` is
//! `(1/g) * ln(c_i / c_{i-1})`, and the harmonic mean sound speed down to a
//! boundary is the total depth over the total travel time. The surface is
//! seeded at depth 0 with the first sample's speed.
//!
//! A raw depth measured with an assumed constant speed is corrected by
//! recovering its travel time and multiplying by the harmonic mean at that
//! depth, interpolated between the bounding profile depths.

use crate::data::storage::round3;
use crate::error::{AppResult, DaqError};
use crate::processing::soundings::Sounding;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Gradients smaller than this (s^-1) are treated as zero.
const MIN_GRADIENT: f64 = 1e-12;

/// A validated profile with its harmonic means.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundSpeedProfile {
    depths: Vec<f64>,
    speeds: Vec<f64>,
    harmonic_means: Vec<f64>,
}

/// One exported profile row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRow {
    /// Metres below the waterline.
    pub depth: f64,
    /// Sampled sound speed (m/s).
    pub speed: f64,
    /// Harmonic mean from the surface down to `depth` (m/s).
    pub harmonic_mean: f64,
}

impl SoundSpeedProfile {
    /// Build from `(depth, speed)` samples in any order.
    ///
    /// Samples with a negative or non-finite depth, or a non-positive speed,
    /// are dropped; repeated depths keep the first sample.
    ///
    /// # Errors
    /// [`DaqError::ProfileGeometry`] when no usable sample remains.
    pub fn from_samples(samples: impl IntoIterator<Item = (f64, f64)>) -> AppResult<Self> {
        let mut usable: Vec<(f64, f64)> = Vec::new();
        for (depth, speed) in samples {
            if depth.is_finite() && depth >= 0.0 && speed.is_finite() && speed > 0.0 {
                usable.push((depth, speed));
            } else {
                warn!(depth, speed, "dropping unusable profile sample");
            }
        }
        usable.sort_by(|a, b| a.0.total_cmp(&b.0));
        let before = usable.len();
        usable.dedup_by(|later, earlier| later.0 == earlier.0);
        if usable.len() < before {
            warn!(
                dropped = before - usable.len(),
                "dropping profile samples with repeated depths"
            );
        }
        if usable.is_empty() {
            return Err(DaqError::ProfileGeometry(
                "profile has no usable samples".into(),
            ));
        }

        let (depths, speeds): (Vec<f64>, Vec<f64>) = usable.into_iter().unzip();
        let harmonic_means = harmonic_means(&depths, &speeds);
        Ok(Self {
            depths,
            speeds,
            harmonic_means,
        })
    }

    /// Load a two-column `depth,speed` CSV; non-numeric rows are skipped.
    pub fn load(path: &Path) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut samples = Vec::new();
        for record in reader.records() {
            let record = record?;
            let parse = |i: usize| record.get(i).and_then(|v| v.parse::<f64>().ok());
            if let (Some(depth), Some(speed)) = (parse(0), parse(1)) {
                samples.push((depth, speed));
            }
        }
        let profile = Self::from_samples(samples)?;
        info!(
            "Loaded {} profile samples from '{}'",
            profile.depths.len(),
            path.display()
        );
        Ok(profile)
    }

    /// Sample depths, strictly increasing.
    pub fn depths(&self) -> &[f64] {
        &self.depths
    }

    /// Sample speeds, one per depth.
    pub fn speeds(&self) -> &[f64] {
        &self.speeds
    }

    /// Cumulative harmonic means, one per depth.
    pub fn harmonic_means(&self) -> &[f64] {
        &self.harmonic_means
    }

    /// The profile as exportable rows.
    pub fn rows(&self) -> Vec<ProfileRow> {
        self.depths
            .iter()
            .zip(&self.speeds)
            .zip(&self.harmonic_means)
            .map(|((&depth, &speed), &harmonic_mean)| ProfileRow {
                depth,
                speed,
                harmonic_mean,
            })
            .collect()
    }

    /// Harmonic mean sound speed at `depth` (positive, metres below the waterline).
    ///
    /// Linear scan for the first profile depth below `depth`; the harmonic mean
    /// is interpolated between that boundary and the one above it. Shallower
    /// than the first sample uses the first harmonic mean, deeper than the last
    /// uses the last. Neither end is extrapolated.
    pub fn harmonic_mean_at(&self, depth: f64) -> f64 {
        match self.depths.iter().position(|&d| depth < d) {
            Some(0) => self.harmonic_means[0],
            Some(i) => {
                let (x0, x1) = (self.depths[i - 1], self.depths[i]);
                let (y0, y1) = (self.harmonic_means[i - 1], self.harmonic_means[i]);
                y0 + (y1 - y0) * (depth - x0) / (x1 - x0)
            }
            None => self.harmonic_means[self.harmonic_means.len() - 1],
        }
    }

    /// Correct a raw `(depth, speed)` pair; returns `(depth, harmonic_mean)`.
    pub fn correct(&self, depth: f64, speed: f64) -> AppResult<(f64, f64)> {
        if !(speed.is_finite() && speed > 0.0) || !depth.is_finite() {
            return Err(DaqError::ProfileGeometry(format!(
                "cannot correct depth {} measured at {} m/s",
                depth, speed
            )));
        }
        let travel_time = depth / speed;
        let harmonic_mean = self.harmonic_mean_at(depth);
        Ok((harmonic_mean * travel_time, harmonic_mean))
    }

    /// Fill the correction fields of one sounding, leaving the raw fields alone.
    ///
    /// `water_depth` is negative below the waterline; the profile works on the
    /// positive depth and the sign is restored.
    pub fn correct_sounding(&self, sounding: &mut Sounding) -> AppResult<()> {
        let (depth, harmonic_mean) = self.correct(-sounding.water_depth, sounding.sound_speed)?;
        let corrected_depth = -depth;
        let shift = corrected_depth - sounding.water_depth;
        sounding.corrected_depth = Some(round3(corrected_depth));
        sounding.corrected_bottom_ellipsoidal_height =
            Some(round3(sounding.bottom_ellipsoidal_height + shift));
        sounding.corrected_sound_speed = Some(round3(harmonic_mean));
        Ok(())
    }

    /// Correct every sounding independently. Returns how many were corrected.
    pub fn correct_soundings(&self, soundings: &mut [Sounding]) -> usize {
        let mut corrected = 0;
        for sounding in soundings.iter_mut() {
            match self.correct_sounding(sounding) {
                Ok(()) => corrected += 1,
                Err(e) => warn!(
                    sequence = sounding.sequence_number,
                    error = %e,
                    "sounding left uncorrected"
                ),
            }
        }
        info!("Corrected {} of {} soundings", corrected, soundings.len());
        corrected
    }
}

/// Cumulative harmonic means, one per sample.
fn harmonic_means(depths: &[f64], speeds: &[f64]) -> Vec<f64> {
    let mut last_depth = 0.0;
    let mut last_speed = speeds[0];
    let mut depth_sum = 0.0;
    let mut time_sum = 0.0;

    depths
        .iter()
        .zip(speeds)
        .map(|(&depth, &speed)| {
            let delta_depth = depth - last_depth;
            let delta_speed = speed - last_speed;
            let travel_time = if delta_depth <= 0.0 {
                0.0
            } else {
                let gradient = delta_speed / delta_depth;
                if gradient.abs() < MIN_GRADIENT {
                    delta_depth / speed
                } else {
                    (speed / last_speed).ln() / gradient
                }
            };

            depth_sum += delta_depth;
            time_sum += travel_time;
            last_depth = depth;
            last_speed = speed;

            if time_sum > 0.0 {
                depth_sum / time_sum
            } else {
                speed
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn sounding(water_depth: f64, sound_speed: f64) -> Sounding {
        Sounding {
            time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            sequence_number: 0,
            latitude: 0.0,
            longitude: 0.0,
            antenna_ellipsoidal_height: 10.0,
            heading: None,
            speed_over_ground: None,
            hdop: None,
            water_depth,
            bottom_ellipsoidal_height: 10.0 + water_depth,
            sound_speed,
            corrected_depth: None,
            corrected_bottom_ellipsoidal_height: None,
            corrected_sound_speed: None,
        }
    }

    #[test]
    fn flat_profile_is_identity() {
        let profile =
            SoundSpeedProfile::from_samples([(0.0, 1500.0), (10.0, 1500.0), (20.0, 1500.0)])
                .unwrap();
        for hm in profile.harmonic_means() {
            assert!((hm - 1500.0).abs() < 1e-9);
        }

        for depth in [0.5, 5.0, 12.3, 50.0] {
            let (corrected, speed) = profile.correct(depth, 1500.0).unwrap();
            assert!((corrected - depth).abs() < 1e-9);
            assert!((speed - 1500.0).abs() < 1e-9);
        }
    }

    #[test]
    fn gradient_layer_matches_closed_form() {
        let profile = SoundSpeedProfile::from_samples([(0.0, 1500.0), (10.0, 1510.0)]).unwrap();
        let expected = 10.0 / ((1510.0f64 / 1500.0).ln() / 1.0);
        assert!((profile.harmonic_means()[1] - expected).abs() < 1e-9);
        // Harmonic mean sits between the end speeds.
        assert!(profile.harmonic_means()[1] > 1500.0 && profile.harmonic_means()[1] < 1510.0);
    }

    #[test]
    fn interpolates_against_bounding_depths() {
        let profile = SoundSpeedProfile::from_samples([(0.0, 1500.0), (10.0, 1520.0)]).unwrap();
        let hm = profile.harmonic_means().to_vec();
        let mid = profile.harmonic_mean_at(5.0);
        assert!((mid - (hm[0] + hm[1]) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn outside_profile_uses_end_values() {
        let profile =
            SoundSpeedProfile::from_samples([(2.0, 1490.0), (10.0, 1500.0)]).unwrap();
        let hm = profile.harmonic_means().to_vec();
        // First layer spans the surface seed to 2 m at constant speed.
        assert!((hm[0] - 1490.0).abs() < 1e-9);
        assert_eq!(profile.harmonic_mean_at(1.0), hm[0]);
        assert_eq!(profile.harmonic_mean_at(100.0), hm[1]);
    }

    #[test]
    fn sounding_above_first_sample_uses_first_mean() {
        let profile = SoundSpeedProfile::from_samples([(4.0, 1480.0), (10.0, 1520.0)]).unwrap();
        let hm = profile.harmonic_means().to_vec();
        assert!(hm[1] > hm[0]);

        let mut shallow = sounding(-2.0, 1500.0);
        profile.correct_sounding(&mut shallow).unwrap();
        assert_eq!(shallow.corrected_sound_speed, Some(1480.0));
        assert_eq!(shallow.corrected_depth, Some(-1.973));
        assert_eq!(shallow.corrected_bottom_ellipsoidal_height, Some(8.027));
        assert_eq!(shallow.water_depth, -2.0);
    }

    #[test]
    fn samples_sorted_and_cleaned() {
        let profile = SoundSpeedProfile::from_samples([
            (10.0, 1500.0),
            (0.0, 1490.0),
            (10.0, 1400.0),
            (5.0, -1.0),
            (-1.0, 1500.0),
        ])
        .unwrap();
        assert_eq!(profile.depths(), &[0.0, 10.0]);
        assert_eq!(profile.speeds(), &[1490.0, 1500.0]);
    }

    #[test]
    fn empty_profile_rejected() {
        assert!(matches!(
            SoundSpeedProfile::from_samples([(1.0, 0.0)]),
            Err(DaqError::ProfileGeometry(_))
        ));
    }

    #[test]
    fn sounding_correction_keeps_raw_fields() {
        let profile = SoundSpeedProfile::from_samples([(0.0, 1480.0), (20.0, 1480.0)]).unwrap();
        let mut s = sounding(-5.5, 1500.0);
        profile.correct_sounding(&mut s).unwrap();

        assert_eq!(s.water_depth, -5.5);
        assert_eq!(s.sound_speed, 1500.0);
        assert_eq!(s.corrected_depth, Some(-5.427));
        assert_eq!(s.corrected_sound_speed, Some(1480.0));
        assert_eq!(s.corrected_bottom_ellipsoidal_height, Some(4.573));
    }

    #[test]
    fn zero_sound_speed_left_uncorrected() {
        let profile = SoundSpeedProfile::from_samples([(0.0, 1500.0)]).unwrap();
        let mut soundings = vec![sounding(-5.0, 0.0), sounding(-5.0, 1500.0)];
        assert_eq!(profile.correct_soundings(&mut soundings), 1);
        assert_eq!(soundings[0].corrected_depth, None);
    }

    #[test]
    fn profile_file_skips_non_numeric_rows() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "depth,speed\n0,1500\n5,1502.5\nnote\n10,1505\n").unwrap();
        let profile = SoundSpeedProfile::load(file.path()).unwrap();
        assert_eq!(profile.depths(), &[0.0, 5.0, 10.0]);
    }
}
