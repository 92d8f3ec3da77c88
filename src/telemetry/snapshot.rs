//! Telemetry payload

use crate::{TargetId, TransportError};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Per-page read time of one target, captured atomically at flush time.
///
/// Serialized as
/// `{"target_id": "...", "client_id": "...", "page_times": [ms, ...]}` where
/// `page_times[i]` is page `i + 1`, rounded to whole milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub target_id: TargetId,
    pub client_id: Uuid,
    #[serde(serialize_with = "serialize_rounded_ms")]
    pub page_times: Vec<f64>,
}

impl TelemetrySnapshot {
    pub fn total_ms(&self) -> f64 {
        self.page_times.iter().sum()
    }

    /// Page times as sent over the wire
    pub fn rounded_ms(&self) -> Vec<u64> {
        self.page_times.iter().map(|t| round_ms(*t)).collect()
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn round_ms(ms: f64) -> u64 {
    if ms.is_finite() && ms > 0.0 {
        ms.round() as u64
    } else {
        0
    }
}

#[allow(clippy::ptr_arg)]
fn serialize_rounded_ms<S: Serializer>(times: &Vec<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(times.iter().map(|t| round_ms(*t)))
}
