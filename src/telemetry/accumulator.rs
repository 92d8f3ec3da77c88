//! Visibility-weighted read-time integration.
//!
//! Each tick adds `elapsed * visibility` to every page. This is a Riemann sum
//! of the true visible-time integral; its error is at most one tick period per
//! visibility change.

use crate::telemetry::PageSet;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct ReadTimeAccumulator {
    last_tick: Instant,
}

impl ReadTimeAccumulator {
    pub fn new(now: Instant) -> Self {
        Self { last_tick: now }
    }

    pub fn last_tick(&self) -> Instant {
        self.last_tick
    }

    /// Integrate the time since the previous tick into `pages`.
    ///
    /// The tick timestamp always advances. Time spent in the background is
    /// consumed without being attributed, so returning to the foreground does
    /// not credit the whole absence to the visible pages. Returns the
    /// attributed milliseconds (before visibility weighting), 0 when
    /// backgrounded.
    pub fn tick(&mut self, now: Instant, foreground: bool, pages: &mut PageSet) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        if !foreground {
            return 0.0;
        }
        let elapsed_ms = elapsed.as_nanos() as f64 / 1_000_000.0;
        for page in pages.pages_mut() {
            page.duration_ms += elapsed_ms * page.visibility;
        }
        elapsed_ms
    }
}
