//! Sounding Editor
//!
//! Windowed review of a sounding set: narrow a `[left, right]` window over
//! sequence numbers, look at the depth range inside it, and delete suspect
//! closed ranges. Deleting filters the working set; the original set is only
//! recoverable by starting again from the saved file.

use crate::data::storage::save_csv;
use crate::error::{AppResult, DaqError};
use crate::processing::soundings::Sounding;
use std::path::Path;
use tracing::info;

/// One end of the review window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    /// Lowest sequence number in the working set.
    Min,
    /// Highest sequence number in the working set.
    Max,
    Seq(u64),
}

impl std::str::FromStr for Extent {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "min" => Ok(Extent::Min),
            "max" => Ok(Extent::Max),
            other => other.parse().map(Extent::Seq).map_err(|_| {
                DaqError::Configuration(format!(
                    "Invalid extent '{}'. Use min, max or a sequence number",
                    other
                ))
            }),
        }
    }
}

/// Working set of soundings under review, with the current window.
#[derive(Debug, Clone)]
pub struct SoundingEditor {
    soundings: Vec<Sounding>,
    left: u64,
    right: u64,
}

impl SoundingEditor {
    /// Start with the window spanning the whole set.
    pub fn new(soundings: Vec<Sounding>) -> Self {
        let mut editor = Self {
            soundings,
            left: 0,
            right: 0,
        };
        editor.left = editor.resolve(Extent::Min);
        editor.right = editor.resolve(Extent::Max);
        editor
    }

    fn resolve(&self, extent: Extent) -> u64 {
        let numbers = self.soundings.iter().map(|s| s.sequence_number);
        match extent {
            Extent::Min => numbers.min().unwrap_or(0),
            Extent::Max => numbers.max().unwrap_or(0),
            Extent::Seq(n) => n,
        }
    }

    /// Current `(left, right)` sequence numbers.
    pub fn window(&self) -> (u64, u64) {
        (self.left, self.right)
    }

    /// Move the window.
    ///
    /// # Errors
    /// [`DaqError::Configuration`] when the left extent lies right of the right one.
    pub fn set_window(&mut self, left: Extent, right: Extent) -> AppResult<()> {
        let (left, right) = (self.resolve(left), self.resolve(right));
        if left > right {
            return Err(DaqError::Configuration(format!(
                "Window [{}, {}] is inverted",
                left, right
            )));
        }
        self.left = left;
        self.right = right;
        Ok(())
    }

    /// Soundings inside the window.
    pub fn visible(&self) -> impl Iterator<Item = &Sounding> {
        let (left, right) = (self.left, self.right);
        self.soundings
            .iter()
            .filter(move |s| (left..=right).contains(&s.sequence_number))
    }

    /// Minimum and maximum depth inside the window, corrected where available.
    pub fn depth_range(&self) -> Option<(f64, f64)> {
        self.visible().map(Sounding::best_depth).fold(None, |range, d| {
            Some(match range {
                None => (d, d),
                Some((lo, hi)) => (lo.min(d), hi.max(d)),
            })
        })
    }

    /// Remove every sounding whose sequence number lies in `[first, last]`.
    /// Returns how many were removed.
    pub fn delete_range(&mut self, first: u64, last: u64) -> usize {
        let (first, last) = if first <= last { (first, last) } else { (last, first) };
        let before = self.soundings.len();
        self.soundings
            .retain(|s| !(first..=last).contains(&s.sequence_number));
        let removed = before - self.soundings.len();
        info!("Deleted {} soundings in [{}, {}]", removed, first, last);
        removed
    }

    /// The working set after deletions.
    pub fn soundings(&self) -> &[Sounding] {
        &self.soundings
    }

    /// Finish editing, saving the working set to `save_to` if given.
    ///
    /// The file is replaced, so saving over the input keeps deletions.
    pub fn finish(self, save_to: Option<&Path>) -> AppResult<Vec<Sounding>> {
        if let Some(path) = save_to {
            save_csv(path, &self.soundings)?;
        } else {
            info!("Finished editing without saving");
        }
        Ok(self.soundings)
    }
}
