//! Visibility tracking
//!
//! The observer reports intersection ratios whenever they cross one of its
//! thresholds. With 101 thresholds this is effectively continuous. Updates are
//! last-write-wins per page; the accumulator samples whatever was stored last.

use crate::telemetry::PageSet;
use log::debug;

/// Threshold resolution the visibility observer should be configured with
pub const OBSERVATION_STEPS: u32 = 100;

/// The observer thresholds: 0.00, 0.01, ..., 1.00
pub fn observation_thresholds() -> Vec<f64> {
    (0..=OBSERVATION_STEPS)
        .map(|i| f64::from(i) / f64::from(OBSERVATION_STEPS))
        .collect()
}

/// Clamp an observed ratio into [0, 1]. Non-finite input counts as hidden.
pub fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

impl PageSet {
    /// Record the latest visible fraction of page `index`.
    ///
    /// Returns `false` when the page is not part of the current render output;
    /// such updates belong to superseded pages and are dropped.
    pub fn observe(&mut self, index: u32, ratio: f64) -> bool {
        match self.page_mut(index) {
            Some(page) if page.attached => {
                page.visibility = clamp_ratio(ratio);
                true
            }
            _ => {
                debug!("dropping visibility update for detached page {}", index);
                false
            }
        }
    }
}
