//! Per-page read-time bookkeeping
//!
//! A [`PageSet`] holds the pages of one target together with their last known
//! visibility and accumulated read time. The submodules operate on it:
//!
//! - [`visibility`]: push-based visibility updates
//! - [`accumulator`]: the periodic visibility-weighted integration step
//! - [`flusher`]: capture, delivery bookkeeping and reset after success
//! - [`snapshot`]: the payload handed to the transport

pub mod accumulator;
pub mod flusher;
pub mod snapshot;
pub mod visibility;

pub use accumulator::ReadTimeAccumulator;
pub use flusher::{FlushDecision, ResetPolicy, TelemetryFlusher};
pub use snapshot::TelemetrySnapshot;

use crate::rendering::RenderedPage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happens to unflushed read time when a target is rendered again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Pages are matched by index; their durations carry over
    #[default]
    CarryOver,
    /// Every pass starts from zero; unflushed time is discarded
    ResetOnRender,
}

/// A rendered page and its read-time measurements
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    index: u32,
    width: f64,
    height: f64,
    visibility: f64,
    duration_ms: f64,
    attached: bool,
}

impl Page {
    fn new(index: u32) -> Self {
        Self {
            index,
            width: 0.0,
            height: 0.0,
            visibility: 0.0,
            duration_ms: 0.0,
            attached: false,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Rendered size in CSS px
    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn visibility(&self) -> f64 {
        self.visibility
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Whether the page belongs to the current render output
    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

/// Pages of one target, keyed by page index.
#[derive(Debug, Clone, Default)]
pub struct PageSet {
    pages: BTreeMap<u32, Page>,
    policy: DurationPolicy,
}

impl PageSet {
    pub fn new(policy: DurationPolicy) -> Self {
        Self {
            pages: BTreeMap::new(),
            policy,
        }
    }

    /// A new render pass started: current pages are superseded.
    pub fn begin_pass(&mut self) {
        match self.policy {
            DurationPolicy::ResetOnRender => self.pages.clear(),
            DurationPolicy::CarryOver => {
                for page in self.pages.values_mut() {
                    page.attached = false;
                    page.visibility = 0.0;
                }
            }
        }
    }

    /// Attach a freshly rendered page. Visibility starts at 0.
    pub fn attach(&mut self, rendered: &RenderedPage) {
        let page = self
            .pages
            .entry(rendered.index)
            .or_insert_with(|| Page::new(rendered.index));
        page.width = rendered.layout.css_width;
        page.height = rendered.layout.css_height;
        page.visibility = 0.0;
        page.attached = true;
    }

    /// The pass ended; drop superseded pages that have nothing left to report.
    pub fn finish_pass(&mut self) {
        self.pages
            .retain(|_, page| page.attached || page.duration_ms > 0.0);
    }

    pub fn get(&self, index: u32) -> Option<&Page> {
        self.pages.get(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    /// Durations ordered by page index; position `i` is page `i + 1`.
    ///
    /// Gaps (pages never rendered) report 0.
    pub fn durations(&self) -> Vec<f64> {
        let len = self.pages.keys().next_back().copied().unwrap_or(0) as usize;
        let mut out = vec![0.0; len];
        for page in self.pages.values() {
            if page.index >= 1 {
                out[page.index as usize - 1] = page.duration_ms;
            }
        }
        out
    }

    pub fn total_ms(&self) -> f64 {
        self.pages.values().map(|p| p.duration_ms).sum()
    }

    fn page_mut(&mut self, index: u32) -> Option<&mut Page> {
        self.pages.get_mut(&index)
    }

    fn pages_mut(&mut self) -> impl Iterator<Item = &mut Page> {
        self.pages.values_mut()
    }
}
