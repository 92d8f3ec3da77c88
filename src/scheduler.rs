//! Per-target render scheduling: debounce, single-flight and retrigger.
//!
//! Every target moves through a small state machine:
//!
//! ```text
//! Idle ──request──▶ Scheduled(deadline) ──deadline──▶ Rendering { retrigger }
//!   ▲                   │  ▲ request restarts the deadline       │
//!   │                   │  └─────────────────────────────────────┤ complete + retrigger
//!   └───────────────────┴──────── complete, no retrigger ◀───────┘
//! ```
//!
//! A request that lands while a pass is active only sets `retrigger`; when the
//! pass completes the target goes straight back to `Scheduled(now)` so the
//! follow-up pass starts without waiting out another debounce window.

use crate::rendering::{RenderConstraints, RenderJob};
use crate::{RenderError, Surface, TargetId, TrackerConfig};
use log::{debug, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Render state of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// Nothing to do
    Idle,
    /// A pass starts once `deadline` passes without further requests
    Scheduled { deadline: Instant },
    /// A pass is in flight; `retrigger` records a request that arrived meanwhile
    Rendering { retrigger: bool },
}

impl RenderPhase {
    /// A trigger arrived at `now`.
    pub fn request(self, now: Instant, debounce: Duration) -> Self {
        match self {
            RenderPhase::Idle | RenderPhase::Scheduled { .. } => RenderPhase::Scheduled {
                deadline: now + debounce,
            },
            RenderPhase::Rendering { .. } => RenderPhase::Rendering { retrigger: true },
        }
    }

    /// Returns the new phase and whether a pass must start now.
    pub fn fire(self, now: Instant) -> (Self, bool) {
        match self {
            RenderPhase::Scheduled { deadline } if deadline <= now => {
                (RenderPhase::Rendering { retrigger: false }, true)
            }
            other => (other, false),
        }
    }

    /// The in-flight pass finished (successfully or not) at `now`.
    pub fn complete(self, now: Instant) -> Self {
        match self {
            RenderPhase::Rendering { retrigger: true } => RenderPhase::Scheduled { deadline: now },
            RenderPhase::Rendering { retrigger: false } => RenderPhase::Idle,
            other => other,
        }
    }

    pub fn is_rendering(&self) -> bool {
        matches!(self, RenderPhase::Rendering { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            RenderPhase::Scheduled { deadline } => Some(*deadline),
            _ => None,
        }
    }
}

/// What the target currently shows in place of (or as) its pages
#[derive(Debug, Clone, PartialEq)]
pub enum TargetView {
    /// Loading placeholder; nothing rendered yet
    Loading,
    /// A pass is producing pages; `pages` have been attached so far
    Partial { pages: u32 },
    /// The last pass completed with `pages` pages
    Ready { pages: u32 },
    /// The last pass failed; shown until a new trigger succeeds
    Failed { reason: String },
}

/// Mutable per-target state owned by the scheduler registry.
#[derive(Debug, Clone)]
pub struct TargetState {
    document: String,
    phase: RenderPhase,
    /// Last width sample in CSS px; 0 until known
    last_width: f64,
    density: f64,
    view: TargetView,
    listeners_attached: bool,
    passes_started: u64,
}

impl TargetState {
    fn new(document: String, density: f64) -> Self {
        Self {
            document,
            phase: RenderPhase::Idle,
            last_width: 0.0,
            density,
            view: TargetView::Loading,
            listeners_attached: false,
            passes_started: 0,
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    pub fn last_width(&self) -> f64 {
        self.last_width
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn view(&self) -> &TargetView {
        &self.view
    }

    pub fn listeners_attached(&self) -> bool {
        self.listeners_attached
    }

    /// Number of render passes started for this target so far
    pub fn passes_started(&self) -> u64 {
        self.passes_started
    }
}

/// Registry of targets and their render state machines.
#[derive(Debug)]
pub struct RenderScheduler {
    targets: HashMap<TargetId, TargetState>,
    debounce: Duration,
    width_epsilon: f64,
    default_density: f64,
    surface: Surface,
}

impl RenderScheduler {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            targets: HashMap::new(),
            debounce: config.debounce(),
            width_epsilon: config.width_epsilon,
            default_density: config.device_pixel_ratio,
            surface: config.surface,
        }
    }

    /// Register a target (or refresh its document source) and schedule a render.
    ///
    /// Returns `true` when the target was not known before.
    pub fn discover(&mut self, target: &TargetId, document: &str, now: Instant) -> bool {
        let is_new = match self.targets.get_mut(target) {
            Some(state) => {
                if state.document != document {
                    state.document = document.to_string();
                }
                false
            }
            None => {
                self.targets.insert(
                    target.clone(),
                    TargetState::new(document.to_string(), self.default_density),
                );
                true
            }
        };
        self.request_render(target, now);
        is_new
    }

    /// Forget a target that left the document.
    pub fn remove(&mut self, target: &TargetId) -> Option<TargetState> {
        self.targets.remove(target)
    }

    /// Ask for a render of `target`. Returns `false` for unknown targets.
    pub fn request_render(&mut self, target: &TargetId, now: Instant) -> bool {
        let Some(state) = self.targets.get_mut(target) else {
            debug!("render requested for unknown target {}", target);
            return false;
        };
        state.phase = state.phase.request(now, self.debounce);
        debug!("render requested for {}: {:?}", target, state.phase);
        true
    }

    /// Size observer fired with the container's new width.
    ///
    /// Only widths that are non-zero and move more than the configured
    /// epsilon away from the last sample count as a change; sub-pixel layout
    /// jitter would otherwise re-render forever.
    pub fn on_resize(&mut self, target: &TargetId, width: f64, now: Instant) -> bool {
        let epsilon = self.width_epsilon;
        let Some(state) = self.targets.get_mut(target) else {
            return false;
        };
        let width = width.round();
        if !width.is_finite() || width <= 0.0 || (width - state.last_width).abs() <= epsilon {
            return false;
        }
        state.last_width = width;
        self.request_render(target, now)
    }

    /// Density observer fired with the new device pixel ratio.
    pub fn on_density_change(&mut self, target: &TargetId, dpr: f64, now: Instant) -> bool {
        let Some(state) = self.targets.get_mut(target) else {
            return false;
        };
        if !dpr.is_finite() || dpr <= 0.0 || dpr == state.density {
            return false;
        }
        state.density = dpr;
        self.request_render(target, now)
    }

    /// Earliest pending debounce deadline across all targets.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.targets.values().filter_map(|s| s.phase.deadline()).min()
    }

    /// Start every pass whose deadline has passed, in target order.
    pub fn start_due(&mut self, now: Instant) -> Vec<RenderJob> {
        let surface = self.surface;
        let mut jobs: Vec<RenderJob> = self
            .targets
            .iter_mut()
            .filter_map(|(id, state)| {
                let (phase, start) = state.phase.fire(now);
                state.phase = phase;
                if !start {
                    return None;
                }
                state.passes_started += 1;
                state.view = TargetView::Loading;
                let width = if state.last_width > 0.0 {
                    state.last_width
                } else {
                    surface.width
                };
                debug!("starting render pass {} for {}", state.passes_started, id);
                Some(RenderJob {
                    target: id.clone(),
                    document: state.document.clone(),
                    constraints: RenderConstraints {
                        width,
                        height: surface.height,
                        device_pixel_ratio: state.density,
                    },
                })
            })
            .collect();
        jobs.sort_by(|a, b| a.target.cmp(&b.target));
        jobs
    }

    /// A page of the in-flight pass was attached.
    pub fn page_attached(&mut self, target: &TargetId, index: u32) {
        if let Some(state) = self.targets.get_mut(target) {
            if state.phase.is_rendering() {
                state.view = TargetView::Partial { pages: index };
            }
        }
    }

    /// The in-flight pass for `target` finished.
    ///
    /// `outcome` carries the page count on success. A failure replaces the
    /// view with a failure placeholder; a retrigger recorded during the pass
    /// is honored either way.
    pub fn complete(
        &mut self,
        target: &TargetId,
        outcome: Result<u32, RenderError>,
        rendered_width: f64,
        now: Instant,
    ) {
        let Some(state) = self.targets.get_mut(target) else {
            debug!("render pass finished for removed target {}", target);
            return;
        };
        if !state.phase.is_rendering() {
            warn!(
                "render completion for {} while {:?}; ignoring",
                target, state.phase
            );
            return;
        }
        match outcome {
            Ok(pages) => {
                state.view = TargetView::Ready { pages };
                if state.last_width <= 0.0 {
                    state.last_width = rendered_width.round();
                }
            }
            Err(err) => {
                warn!("Failed to render {}: {}", target, err);
                state.view = TargetView::Failed {
                    reason: err.to_string(),
                };
            }
        }
        state.phase = state.phase.complete(now);
        debug!("render pass finished for {}: {:?}", target, state.phase);
    }

    /// Mark size/density listeners attached. Returns `true` only the first time.
    pub fn attach_listeners(&mut self, target: &TargetId) -> bool {
        match self.targets.get_mut(target) {
            Some(state) if !state.listeners_attached => {
                state.listeners_attached = true;
                true
            }
            _ => false,
        }
    }

    pub fn target(&self, target: &TargetId) -> Option<&TargetState> {
        self.targets.get(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = (&TargetId, &TargetState)> {
        self.targets.iter()
    }
}
