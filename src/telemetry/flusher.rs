//! Flush bookkeeping for one target.
//!
//! The flusher never talks to the network. `poll` decides whether a flush
//! starts and captures the snapshot; the session delivers it and reports the
//! outcome back through `complete`. Durations are only touched after a
//! confirmed success.
//!
//! With the default [`ResetPolicy::ClearToZero`], time that accrues on a page
//! while the send is in flight is cleared along with the flushed value. That
//! under-counts by at most one network round trip per flush and is accepted.

use crate::telemetry::{PageSet, TelemetrySnapshot};
use crate::{TargetId, TransportError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// How page durations are reset after a successful flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Flushed pages go back to 0, including time accrued during the send
    #[default]
    ClearToZero,
    /// Only the flushed amount is removed; time accrued during the send stays
    SubtractFlushed,
}

/// Outcome of a flush evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FlushDecision {
    /// Deliver this snapshot; the flusher is now in flight
    Send(TelemetrySnapshot),
    /// A previous flush has not resolved yet
    InFlight,
    /// The minimum interval since the last successful flush has not passed
    TooSoon,
    /// Nothing accumulated since the last successful flush
    Empty,
}

#[derive(Debug, Clone)]
struct InFlight {
    id: u64,
    started: Instant,
    captured: Vec<f64>,
}

#[derive(Debug)]
pub struct TelemetryFlusher {
    target: TargetId,
    client_id: Uuid,
    min_interval: Duration,
    reset_policy: ResetPolicy,
    last_success_start: Instant,
    in_flight: Option<InFlight>,
    failures: u32,
}

impl TelemetryFlusher {
    /// The first flush becomes eligible `min_interval` after `now`.
    pub fn new(
        target: TargetId,
        client_id: Uuid,
        min_interval: Duration,
        reset_policy: ResetPolicy,
        now: Instant,
    ) -> Self {
        Self {
            target,
            client_id,
            min_interval,
            reset_policy,
            last_success_start: now,
            in_flight: None,
            failures: 0,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Consecutive failed deliveries since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Decide whether to start a flush at `now`, capturing the snapshot if so.
    ///
    /// A started flush is tagged with `flight`; only a completion carrying
    /// the same id resolves it.
    pub fn poll(&mut self, now: Instant, pages: &PageSet, flight: u64) -> FlushDecision {
        if self.in_flight.is_some() {
            return FlushDecision::InFlight;
        }
        if now.saturating_duration_since(self.last_success_start) < self.min_interval {
            return FlushDecision::TooSoon;
        }
        let captured = pages.durations();
        if !captured.iter().any(|ms| *ms > 0.0) {
            return FlushDecision::Empty;
        }

        debug!(
            "flushing {} pages for {} ({:.0}ms total)",
            captured.len(),
            self.target,
            pages.total_ms()
        );
        self.in_flight = Some(InFlight {
            id: flight,
            started: now,
            captured: captured.clone(),
        });
        FlushDecision::Send(TelemetrySnapshot {
            target_id: self.target.clone(),
            client_id: self.client_id,
            page_times: captured,
        })
    }

    /// Apply the transport outcome of flush `flight`.
    ///
    /// On success the captured pages are reset according to the policy; on
    /// failure nothing changes and the next evaluation retries with whatever
    /// has accumulated by then. A completion for any other flight (one
    /// started before the target was replaced) is ignored. Returns `true` on
    /// success.
    pub fn complete(
        &mut self,
        flight: u64,
        outcome: &Result<(), TransportError>,
        pages: &mut PageSet,
    ) -> bool {
        match &self.in_flight {
            Some(current) if current.id == flight => {}
            Some(current) => {
                debug!(
                    "ignoring completion of flush {} for {}; flush {} is in flight",
                    flight, self.target, current.id
                );
                return false;
            }
            None => {
                warn!("flush completion for {} with no flush in flight", self.target);
                return false;
            }
        }
        let Some(flight) = self.in_flight.take() else {
            return false;
        };
        match outcome {
            Ok(()) => {
                self.last_success_start = flight.started;
                self.failures = 0;
                for (i, flushed) in flight.captured.iter().enumerate() {
                    if let Some(page) = pages.page_mut(i as u32 + 1) {
                        page.duration_ms = match self.reset_policy {
                            ResetPolicy::ClearToZero => 0.0,
                            ResetPolicy::SubtractFlushed => (page.duration_ms - flushed).max(0.0),
                        };
                    }
                }
                true
            }
            Err(err) => {
                self.failures += 1;
                warn!(
                    "Failed to deliver telemetry for {} (attempt {}): {}",
                    self.target, self.failures, err
                );
                false
            }
        }
    }
}
